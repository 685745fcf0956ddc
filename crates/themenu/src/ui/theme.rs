use std::fmt;
use std::str::FromStr;

use ratatui::style::Color;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub background: Color,
    pub item_background: Color,
    pub item_text: Color,
    pub text_busy: Color,
}

impl Theme {
    pub const DRACULA: Theme = Theme {
        background: Color::Rgb(40, 42, 54),
        item_background: Color::Rgb(68, 71, 90),
        item_text: Color::Rgb(248, 248, 242),
        text_busy: Color::Rgb(255, 184, 108),
    };

    // The two plain themes have no busy color of their own; busy items keep
    // the item text color and rely on the annotation.
    pub const GRAYSCALE: Theme = Theme {
        background: Color::Rgb(20, 20, 20),
        item_background: Color::Rgb(60, 60, 60),
        item_text: Color::Rgb(240, 240, 240),
        text_busy: Color::Rgb(240, 240, 240),
    };

    pub const BLUE_ON_BLACK: Theme = Theme {
        background: Color::Rgb(20, 20, 20),
        item_background: Color::Rgb(0, 100, 200),
        item_text: Color::Rgb(255, 255, 255),
        text_busy: Color::Rgb(255, 255, 255),
    };
}

impl Default for Theme {
    fn default() -> Self {
        Theme::DRACULA
    }
}

/// Theme names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeName {
    #[default]
    Dracula,
    Grayscale,
    BlueOnBlack,
}

impl ThemeName {
    pub fn theme(self) -> Theme {
        match self {
            ThemeName::Dracula => Theme::DRACULA,
            ThemeName::Grayscale => Theme::GRAYSCALE,
            ThemeName::BlueOnBlack => Theme::BLUE_ON_BLACK,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeName::Dracula => "dracula",
            ThemeName::Grayscale => "grayscale",
            ThemeName::BlueOnBlack => "blue-on-black",
        }
    }
}

impl fmt::Display for ThemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dracula" => Ok(ThemeName::Dracula),
            "grayscale" | "greyscale" => Ok(ThemeName::Grayscale),
            "blue-on-black" | "blueonblack" => Ok(ThemeName::BlueOnBlack),
            other => Err(Error::msg(format!(
                "unknown theme '{other}' (expected dracula, grayscale or blue-on-black)"
            ))),
        }
    }
}

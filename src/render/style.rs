//! Render styles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in style presets plus free text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStyle {
    #[default]
    TopDownGameArt,
    FantasyIllustration,
    Photorealistic,
    PixelArt,
    Watercolor,
    Anime,
    DarkFantasy,
    Minimalist,
    Isometric,
    Custom(String),
}

impl RenderStyle {
    pub const PRESETS: [RenderStyle; 9] = [
        RenderStyle::TopDownGameArt,
        RenderStyle::FantasyIllustration,
        RenderStyle::Photorealistic,
        RenderStyle::PixelArt,
        RenderStyle::Watercolor,
        RenderStyle::Anime,
        RenderStyle::DarkFantasy,
        RenderStyle::Minimalist,
        RenderStyle::Isometric,
    ];

    /// Display name of the preset
    pub fn label(&self) -> &str {
        match self {
            RenderStyle::TopDownGameArt => "Top-down 2D Game Art",
            RenderStyle::FantasyIllustration => "Fantasy Illustration",
            RenderStyle::Photorealistic => "Photorealistic",
            RenderStyle::PixelArt => "Pixel Art",
            RenderStyle::Watercolor => "Watercolor",
            RenderStyle::Anime => "Anime/Manga",
            RenderStyle::DarkFantasy => "Dark Fantasy",
            RenderStyle::Minimalist => "Minimalist",
            RenderStyle::Isometric => "Isometric",
            RenderStyle::Custom(text) => text,
        }
    }

    /// Phrase handed to the image model
    pub fn phrase(&self) -> &str {
        match self {
            RenderStyle::TopDownGameArt => "top-down 2D game art style, clean lines, vibrant colors",
            RenderStyle::FantasyIllustration => {
                "fantasy illustration style, detailed, painterly, magical atmosphere"
            }
            RenderStyle::Photorealistic => {
                "photorealistic style, highly detailed, realistic lighting and textures"
            }
            RenderStyle::PixelArt => "pixel art style, retro 16-bit aesthetic, limited color palette",
            RenderStyle::Watercolor => {
                "watercolor painting style, soft edges, flowing colors, artistic"
            }
            RenderStyle::Anime => "anime style, cel-shaded, vibrant, Japanese animation aesthetic",
            RenderStyle::DarkFantasy => {
                "dark fantasy style, moody lighting, gothic atmosphere, detailed"
            }
            RenderStyle::Minimalist => "minimalist style, simple shapes, clean design, limited colors",
            RenderStyle::Isometric => "isometric view, 3D-like 2D perspective, game asset style",
            RenderStyle::Custom(text) => text,
        }
    }

    /// Match a preset by label or snake_case name; anything else is custom
    pub fn parse(text: &str) -> Self {
        let wanted = normalize(text);
        Self::PRESETS
            .iter()
            .find(|preset| {
                normalize(preset.label()) == wanted || normalize(preset.key()) == wanted
            })
            .cloned()
            .unwrap_or_else(|| RenderStyle::Custom(text.trim().to_string()))
    }

    fn key(&self) -> &str {
        match self {
            RenderStyle::TopDownGameArt => "top_down_game_art",
            RenderStyle::FantasyIllustration => "fantasy_illustration",
            RenderStyle::Photorealistic => "photorealistic",
            RenderStyle::PixelArt => "pixel_art",
            RenderStyle::Watercolor => "watercolor",
            RenderStyle::Anime => "anime",
            RenderStyle::DarkFantasy => "dark_fantasy",
            RenderStyle::Minimalist => "minimalist",
            RenderStyle::Isometric => "isometric",
            RenderStyle::Custom(text) => text,
        }
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

impl fmt::Display for RenderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presets_and_custom() {
        assert_eq!(RenderStyle::parse("pixel art"), RenderStyle::PixelArt);
        assert_eq!(RenderStyle::parse("Top-down 2D Game Art"), RenderStyle::TopDownGameArt);
        assert_eq!(RenderStyle::parse("top-down game art"), RenderStyle::TopDownGameArt);
        assert_eq!(RenderStyle::parse("Anime/Manga"), RenderStyle::Anime);
        assert_eq!(
            RenderStyle::parse("  charcoal sketch "),
            RenderStyle::Custom("charcoal sketch".to_string())
        );
    }

    #[test]
    fn test_custom_phrase_is_verbatim() {
        let style = RenderStyle::Custom("stained glass".to_string());
        assert_eq!(style.phrase(), "stained glass");
        assert!(RenderStyle::Watercolor.phrase().contains("watercolor"));
    }
}

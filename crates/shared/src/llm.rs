use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

pub const MIN_MAX_TOKENS: u32 = 128;
pub const MAX_MAX_TOKENS: u32 = 8192;

#[derive(AsRefStr, Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize)]
pub enum ChatRole {
    #[serde(rename = "system")]
    #[strum(serialize = "system")]
    System,
    #[serde(rename = "user")]
    #[strum(serialize = "user")]
    User,
    #[serde(rename = "assistant")]
    #[strum(serialize = "assistant")]
    Assistant,
}

/// Sampling parameters handed to the token source for a single generation.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Upper bound on generated tokens. Enforced by the token source.
    pub max_tokens: u32,
    pub temperature: f32,
    pub seed: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2024,
            temperature: 0.8,
            seed: 1234,
        }
    }
}

impl GenerationParams {
    /// Clamp parameters to the range the model can handle. The seed is left
    /// as is.
    pub fn clamped(&self) -> Self {
        let temperature = if self.temperature.is_nan() {
            0.0
        } else {
            self.temperature.clamp(0.0, 1.0)
        };

        Self {
            max_tokens: self.max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS),
            temperature,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ChatRole, GenerationParams};

    #[test]
    fn test_clamp_params() {
        let params = GenerationParams {
            max_tokens: 10,
            temperature: 1.7,
            seed: u32::MAX,
        }
        .clamped();
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.temperature, 1.0);
        assert_eq!(params.seed, u32::MAX);

        let params = GenerationParams {
            max_tokens: 100_000,
            temperature: -0.5,
            seed: 0,
        }
        .clamped();
        assert_eq!(params.max_tokens, 8192);
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn test_defaults_are_in_range() {
        let params = GenerationParams::default();
        assert_eq!(params, params.clamped());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(ChatRole::System.to_string(), "system");
        assert_eq!(ChatRole::User.as_ref(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
    }
}

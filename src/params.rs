use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Tiktok, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            "instagram" => Ok(Platform::Instagram),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// A bounded integer option, sent under `key`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl CountSpec {
    pub fn clamp(&self, value: i64) -> u32 {
        value.clamp(self.min as i64, self.max as i64) as u32
    }

    /// Coerces whatever the view sent. Anything that is not a number lands on `min`.
    fn coerce(&self, raw: &serde_json::Value) -> u32 {
        let parsed = match raw {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            serde_json::Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
            _ => None,
        };
        match parsed {
            Some(v) => self.clamp(v),
            None => self.min,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    pub allowed: Vec<Platform>,
    pub default: Vec<Platform>,
}

/// The parameters one feature understands.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParamSchema {
    pub counts: Vec<CountSpec>,
    pub platforms: Option<PlatformSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub platforms: BTreeSet<Platform>,
}

impl Parameters {
    pub fn count(&self, key: &str) -> Option<u32> {
        self.counts.get(key).copied()
    }

    pub fn platforms_csv(&self) -> String {
        self.platforms.iter().map(Platform::as_str).collect::<Vec<_>>().join(",")
    }
}

/// Raw parameter update from the view. Counts stay loosely typed so they can be coerced.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInput {
    #[serde(default)]
    pub counts: HashMap<String, serde_json::Value>,
    pub platforms: Option<Vec<String>>,
}

impl ParamSchema {
    pub fn count(mut self, key: &'static str, label: &'static str, min: u32, max: u32, default: u32) -> Self {
        self.counts.push(CountSpec { key, label, min, max, default });
        self
    }

    pub fn with_platforms(mut self, default: Vec<Platform>) -> Self {
        self.platforms = Some(PlatformSpec {
            allowed: Platform::ALL.to_vec(),
            default,
        });
        self
    }

    pub fn defaults(&self) -> Parameters {
        Parameters {
            counts: self.counts.iter().map(|c| (c.key.to_string(), c.default)).collect(),
            platforms: self
                .platforms
                .as_ref()
                .map(|p| p.default.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Merges `input` into `current`, clamping every count into its range.
    pub fn apply(&self, current: &mut Parameters, input: &ParameterInput) {
        for (key, raw) in &input.counts {
            match self.counts.iter().find(|c| c.key == key) {
                Some(spec) => {
                    let value = spec.coerce(raw);
                    if raw.as_i64() != Some(value as i64) {
                        tracing::debug!(key = %key, raw = %raw, clamped = value, "parameter coerced");
                    }
                    current.counts.insert(spec.key.to_string(), value);
                }
                None => warn!(key = %key, "ignoring unknown parameter"),
            }
        }

        if let Some(requested) = &input.platforms {
            match &self.platforms {
                Some(spec) => {
                    current.platforms = requested
                        .iter()
                        .filter_map(|s| match s.parse::<Platform>() {
                            Ok(p) if spec.allowed.contains(&p) => Some(p),
                            Ok(p) => {
                                warn!(platform = %p, "platform not offered by this feature");
                                None
                            }
                            Err(e) => {
                                warn!("{e}");
                                None
                            }
                        })
                        .collect();
                }
                None => warn!("feature takes no platform selection, ignoring"),
            }
        }
    }

    /// Submit-time checks that are rejections, not coercions.
    pub fn check_ready(&self, params: &Parameters) -> Result<(), ControllerError> {
        if self.platforms.is_some() && params.platforms.is_empty() {
            return Err(ControllerError::validation("Please select at least one platform."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn reels() -> ParamSchema {
        ParamSchema::default().count("numReels", "Number of reels", 1, 3, 1)
    }

    fn hashtags() -> ParamSchema {
        ParamSchema::default()
            .count("hashtagCount", "Number of hashtags", 5, 30, 15)
            .with_platforms(Platform::ALL.to_vec())
    }

    fn set(schema: &ParamSchema, key: &str, raw: serde_json::Value) -> u32 {
        let mut params = schema.defaults();
        let input = ParameterInput {
            counts: HashMap::from([(key.to_string(), raw)]),
            platforms: None,
        };
        schema.apply(&mut params, &input);
        params.count(key).unwrap()
    }

    #[test]
    fn counts_clamp_into_range() {
        let s = reels();
        assert_eq!(set(&s, "numReels", json!(0)), 1);
        assert_eq!(set(&s, "numReels", json!(99)), 3);
        assert_eq!(set(&s, "numReels", json!(-4)), 1);
        assert_eq!(set(&s, "numReels", json!(2)), 2);

        let h = hashtags();
        assert_eq!(set(&h, "hashtagCount", json!(2)), 5);
        assert_eq!(set(&h, "hashtagCount", json!(31)), 30);
        assert_eq!(set(&h, "hashtagCount", json!(i64::MAX)), 30);
    }

    #[test]
    fn loose_inputs_are_coerced() {
        let s = reels();
        assert_eq!(set(&s, "numReels", json!("2")), 2);
        assert_eq!(set(&s, "numReels", json!(2.9)), 2);
        assert_eq!(set(&s, "numReels", json!("lots")), 1);
        assert_eq!(set(&s, "numReels", json!(null)), 1);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let s = reels();
        let mut params = s.defaults();
        let input = ParameterInput {
            counts: HashMap::from([("numShorts".to_string(), json!(3))]),
            platforms: None,
        };
        s.apply(&mut params, &input);
        assert_eq!(params, s.defaults());
    }

    #[test]
    fn platforms_filter_unknown_names() {
        let h = hashtags();
        let mut params = h.defaults();
        let input = ParameterInput {
            counts: HashMap::new(),
            platforms: Some(vec!["TikTok".into(), "myspace".into(), "youtube".into()]),
        };
        h.apply(&mut params, &input);
        assert_eq!(params.platforms, BTreeSet::from([Platform::Youtube, Platform::Tiktok]));
        assert_eq!(params.platforms_csv(), "youtube,tiktok");
    }

    #[test]
    fn empty_platform_selection_is_rejected_at_submit() {
        let h = hashtags();
        let mut params = h.defaults();
        h.apply(
            &mut params,
            &ParameterInput {
                counts: HashMap::new(),
                platforms: Some(vec![]),
            },
        );
        let err = h.check_ready(&params).unwrap_err();
        assert_eq!(err.user_message(), "Please select at least one platform.");
        assert!(reels().check_ready(&reels().defaults()).is_ok());
    }
}

use foundation::MapLocation;
use serde::{Deserialize, Serialize};

/// Preset value that switches `layers` to an explicit `r,g,b` band triple.
pub const CUSTOM_PRESET: &str = "CUSTOM";

/// Layer selector derived from `preset` and `layers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedLayers {
    Rgb { r: String, g: String, b: String },
    Preset(String),
}

impl ParsedLayers {
    /// Derive the selector.
    ///
    /// With the custom preset, `raw_layers` must hold at least three
    /// comma-separated channels (extra channels are ignored); otherwise there
    /// is no selector. Any other preset passes through by name.
    pub fn derive(preset: Option<&str>, raw_layers: Option<&str>) -> Option<Self> {
        match preset {
            Some(CUSTOM_PRESET) => {
                let raw = raw_layers.filter(|raw| !raw.is_empty())?;
                let mut channels = raw.split(',');
                let (r, g, b) = (channels.next()?, channels.next()?, channels.next()?);
                Some(ParsedLayers::Rgb {
                    r: r.to_string(),
                    g: g.to_string(),
                    b: b.to_string(),
                })
            }
            Some(preset) => Some(ParsedLayers::Preset(preset.to_string())),
            None => None,
        }
    }
}

/// Typed view request decoded from a URL fragment.
///
/// Every field is optional; a request with no fields means "no deep link".
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLinkRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalscript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalscript_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atm_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_layers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<MapLocation>,
}

impl DeepLinkRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn parsed_layers(&self) -> Option<ParsedLayers> {
        ParsedLayers::derive(self.preset.as_deref(), self.raw_layers.as_deref())
    }

    /// Non-empty `datasource`, if any.
    pub fn datasource_name(&self) -> Option<&str> {
        self.datasource.as_deref().filter(|name| !name.is_empty())
    }

    /// Non-empty `instanceId`, if any.
    pub fn target_instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether the request names an instance at all.
    pub fn has_target(&self) -> bool {
        self.datasource_name().is_some() || self.target_instance_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{DeepLinkRequest, ParsedLayers};

    #[test]
    fn custom_preset_splits_channels() {
        assert_eq!(
            ParsedLayers::derive(Some("CUSTOM"), Some("B04,B03,B02")),
            Some(ParsedLayers::Rgb {
                r: "B04".into(),
                g: "B03".into(),
                b: "B02".into(),
            })
        );
    }

    #[test]
    fn custom_preset_without_enough_channels_has_no_selector() {
        assert_eq!(ParsedLayers::derive(Some("CUSTOM"), None), None);
        assert_eq!(ParsedLayers::derive(Some("CUSTOM"), Some("")), None);
        assert_eq!(ParsedLayers::derive(Some("CUSTOM"), Some("B04,B03")), None);
    }

    #[test]
    fn named_preset_passes_through() {
        assert_eq!(
            ParsedLayers::derive(Some("NATURAL-COLOR"), Some("B04,B03,B02")),
            Some(ParsedLayers::Preset("NATURAL-COLOR".into()))
        );
        assert_eq!(ParsedLayers::derive(None, Some("B04,B03,B02")), None);
    }

    #[test]
    fn empty_names_are_not_targets() {
        let req = DeepLinkRequest {
            datasource: Some(String::new()),
            instance_id: Some(String::new()),
            ..Default::default()
        };
        assert!(!req.is_empty());
        assert!(!req.has_target());
    }

    #[test]
    fn serializes_present_fields_only() {
        let req = DeepLinkRequest {
            datasource: Some("S2".into()),
            gain: Some(1.5),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({ "datasource": "S2", "gain": 1.5 }));
    }
}

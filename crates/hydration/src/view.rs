use catalog::Instance;
use foundation::{MapLocation, ResolutionId};
use fragment::{DeepLinkRequest, ParsedLayers};
use serde::Serialize;
use serde_json::{Map, Value};

/// Rendering parameters decoded from a deep link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    pub datasource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub evalscript: String,
    pub evalscripturl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atm_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<ParsedLayers>,
}

impl RenderParams {
    /// Parameters of `request` shown on the instance named `datasource`.
    pub fn from_request(request: &DeepLinkRequest, datasource: &str) -> Self {
        Self {
            datasource: datasource.to_string(),
            preset: request.preset.clone(),
            time: request.time.clone(),
            evalscript: request.evalscript.clone().unwrap_or_default(),
            evalscripturl: request.evalscript_url.clone().unwrap_or_default(),
            gain: request.gain,
            gamma: request.gamma,
            atm_filter: request.atm_filter.clone(),
            layers: request.parsed_layers(),
        }
    }
}

/// The resolved, renderable view.
///
/// Never mutated after composition; a later hydration replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedView {
    pub resolution: ResolutionId,
    pub active_layer: Instance,
    pub params: RenderParams,
    pub location: Option<MapLocation>,
}

impl SelectedView {
    pub fn compose(resolution: ResolutionId, instance: Instance, request: &DeepLinkRequest) -> Self {
        let params = RenderParams::from_request(request, &instance.name);
        Self {
            resolution,
            active_layer: instance,
            params,
            location: request.location,
        }
    }

    /// Single JSON object for the map.
    ///
    /// Later layers win on key clashes: instance fields, then rendering
    /// parameters, then the location override. Absent parameters do not
    /// erase instance fields. The full instance is also kept under
    /// `activeLayer`.
    pub fn flattened(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("activeLayer".to_string(), to_value(&self.active_layer));

        merge(&mut out, to_value(&self.active_layer));
        merge(&mut out, to_value(&self.params));
        if let Some(location) = &self.location {
            merge(&mut out, to_value(location));
        }
        out
    }
}

impl Serialize for SelectedView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.flattened().serialize(serializer)
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    // Plain data with string keys; serialization cannot fail.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn merge(out: &mut Map<String, Value>, layer: Value) {
    if let Value::Object(fields) = layer {
        out.extend(fields);
    }
}

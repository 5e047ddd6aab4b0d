// Very partial take on the stable diffusion image metadata proposal: it
// carries the whole effective configuration as image data and nothing
// about grids. Consumers should not treat the layout as stable.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ArgsError;
use crate::options::Options;

pub const APP_ID: &str = "lstein/stable-diffusion";
pub const APP_VERSION: &str = "v1.15";
pub const MODEL_LABEL: &str = "stable diffusion";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub model: &'static str,
    pub model_id: String,
    pub app_id: &'static str,
    pub app_version: &'static str,
    pub image: Map<String, Value>,
}

pub fn format_metadata(opts: &Options) -> Result<Metadata, ArgsError> {
    Ok(Metadata {
        model: MODEL_LABEL,
        model_id: opts.get_as("model")?,
        app_id: APP_ID,
        app_version: APP_VERSION,
        image: opts.to_dict(&[])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::StartupArgs;
    use serde_json::json;

    #[test]
    fn test_format_metadata() {
        let startup = StartupArgs::try_parse_shell(["dream", "--model", "laion400m"]).unwrap();
        let mut opts = Options::new(startup).unwrap();
        opts.parse_cmd("a lighthouse at dusk -s 25").unwrap();

        let meta = format_metadata(&opts).unwrap();
        assert_eq!(meta.model, "stable diffusion");
        assert_eq!(meta.model_id, "laion400m");
        assert_eq!(meta.app_id, APP_ID);
        assert_eq!(meta.app_version, "v1.15");
        assert_eq!(meta.image["prompt"], json!("a lighthouse at dusk"));
        assert_eq!(meta.image["steps"], json!(25));
    }

    #[test]
    fn test_metadata_serializes_flat_record() {
        let startup = StartupArgs::try_parse_shell(["dream"]).unwrap();
        let opts = Options::new(startup).unwrap();
        let value = serde_json::to_value(format_metadata(&opts).unwrap()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["model", "model_id", "app_id", "app_version", "image"]);
        assert_eq!(value["image"]["model"], json!("stable-diffusion-1.4"));
    }
}

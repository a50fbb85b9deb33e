//! Canned weather lookup used for demos and tests.

use async_trait::async_trait;
use serde_json::Value;

use super::{FieldKind, InputSchema, Tool, ToolHandler, ToolOutput, ToolSpec};

pub const WEATHER_TOOL: &str = "weather";

pub struct Weather;

impl Weather {
    pub fn forecast(query: &str) -> &'static str {
        let place = query.trim().to_lowercase();
        if place == "sf" || place.contains("san francisco") {
            "It's 60 degrees and foggy."
        } else {
            "It's 90 degrees and sunny."
        }
    }
}

#[async_trait]
impl ToolHandler for Weather {
    async fn call(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
        Ok(ToolOutput::text(Self::forecast(query)))
    }
}

impl Tool for Weather {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            WEATHER_TOOL,
            "Get the current weather for a location.",
            InputSchema::new().required("query", FieldKind::String, "City or place name"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn san_francisco_is_foggy() {
        assert_eq!(Weather::forecast("San Francisco"), "It's 60 degrees and foggy.");
        assert_eq!(Weather::forecast("sf"), "It's 60 degrees and foggy.");
        assert_eq!(Weather::forecast("weather in san francisco, CA"), "It's 60 degrees and foggy.");
    }

    #[test]
    fn everywhere_else_is_sunny() {
        assert_eq!(Weather::forecast("Phoenix"), "It's 90 degrees and sunny.");
        assert_eq!(Weather::forecast(""), "It's 90 degrees and sunny.");
    }
}

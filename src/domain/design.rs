//! Design document: the timeline a client asks us to render.
//!
//! Only the fields the orchestrator reasons about are typed precisely. Item
//! details beyond `duration` belong to the external renderer and are carried
//! through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

use super::error::DomainError;

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_DURATION_MS: f64 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    #[serde(deserialize_with = "whole_number")]
    pub width: u32,
    #[serde(deserialize_with = "whole_number")]
    pub height: u32,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Placement of an item on the timeline, in milliseconds.
///
/// A missing, null or zero `from` starts at 0. A missing, null or zero `to`
/// leaves the length to `details.duration`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Display {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
}

impl Display {
    pub fn start_ms(&self) -> f64 {
        self.from.unwrap_or(0.0)
    }

    /// Explicit end time, if one is set to a non-zero value.
    pub fn end_ms(&self) -> Option<f64> {
        self.to.filter(|to| *to != 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub display: Display,
    #[serde(deserialize_with = "null_as_default")]
    pub details: ItemDetails,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackItem {
    /// Item end time: `display.to` when set, otherwise `display.from + details.duration`.
    pub fn end_ms(&self) -> f64 {
        let start = self.display.start_ms();
        let length = match self.display.end_ms() {
            Some(to) => to - start,
            None => self.details.duration.unwrap_or(0.0),
        };
        start + length
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn to_whole_number<E: de::Error>(value: f64) -> Result<u32, E> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(E::custom(format!("expected a non-negative integer, got {value}")));
    }
    Ok(value.round() as u32)
}

/// Accepts `30` as well as `30.0`.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    to_whole_number(f64::deserialize(deserializer)?)
}

fn fps_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        Some(value) => to_whole_number(value),
        None => Ok(DEFAULT_FPS),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Background {
    Color(String),
    Image(String),
    Video(String),
}

impl Default for Background {
    fn default() -> Self {
        Background::Color("white".to_string())
    }
}

/// Timeline document consumed by the render pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Design {
    pub track_items_map: BTreeMap<String, TrackItem>,
    pub track_item_ids: Vec<String>,
    pub tracks: Vec<Value>,
    pub structure: Vec<Value>,
    pub transitions_map: BTreeMap<String, Value>,
    pub transition_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub size: Size,
    #[serde(deserialize_with = "fps_or_default")]
    pub fps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub background: Background,
}

impl Default for Design {
    fn default() -> Self {
        Self {
            track_items_map: BTreeMap::new(),
            track_item_ids: Vec::new(),
            tracks: Vec::new(),
            structure: Vec::new(),
            transitions_map: BTreeMap::new(),
            transition_ids: Vec::new(),
            size: Size::default(),
            fps: DEFAULT_FPS,
            duration: None,
            background: Background::default(),
        }
    }
}

impl Design {
    /// Decode and validate a raw JSON document.
    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        let design: Design = serde_json::from_value(value)
            .map_err(|err| DomainError::invalid_design(err.to_string()))?;
        design.validate()?;
        Ok(design)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(DomainError::invalid_design(
                "size must have positive width and height",
            ));
        }
        if self.fps == 0 {
            return Err(DomainError::invalid_design("fps must be positive"));
        }
        for (id, item) in &self.track_items_map {
            let end = item.end_ms();
            if !end.is_finite() || end < 0.0 {
                return Err(DomainError::invalid_design(format!(
                    "track item `{id}` has an invalid end time ({end})"
                )));
            }
        }
        Ok(())
    }

    /// Latest item end time, or `None` when the timeline has no items.
    pub fn max_item_end_ms(&self) -> Option<f64> {
        self.track_items_map
            .values()
            .map(TrackItem::end_ms)
            .reduce(f64::max)
    }

    /// Effective duration in milliseconds.
    ///
    /// A positive item end time wins over the stated duration; a missing or
    /// zero stated duration falls back to [`DEFAULT_DURATION_MS`].
    pub fn effective_duration_ms(&self) -> f64 {
        match self.max_item_end_ms() {
            Some(end) if end > 0.0 => end,
            _ => self
                .duration
                .filter(|duration| *duration != 0.0)
                .unwrap_or(DEFAULT_DURATION_MS),
        }
    }
}

/// Convert a duration to a frame count, never returning fewer than one frame.
pub fn frames_for(duration_ms: f64, fps: u32) -> u32 {
    let frames = (duration_ms / 1000.0 * f64::from(fps)).ceil();
    if frames.is_nan() || frames < 1.0 {
        1
    } else if frames >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        frames as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derives_duration_from_latest_item_end() {
        let design = Design::from_value(json!({
            "trackItemsMap": {
                "a": {"display": {"from": 0, "to": 2000}},
                "b": {"display": {"from": 1000}, "details": {"duration": 4000}}
            }
        }))
        .expect("valid design");

        assert_eq!(design.effective_duration_ms(), 5000.0);
        assert_eq!(frames_for(design.effective_duration_ms(), 30), 150);
    }

    #[test]
    fn item_end_overrides_stated_duration() {
        let design = Design::from_value(json!({
            "duration": 60000,
            "trackItemsMap": {"a": {"display": {"from": 500, "to": 1500}}}
        }))
        .expect("valid design");

        assert_eq!(design.effective_duration_ms(), 1500.0);
    }

    #[test]
    fn empty_design_falls_back_to_default_duration() {
        let design = Design::from_value(json!({})).expect("valid design");

        assert_eq!(design.effective_duration_ms(), DEFAULT_DURATION_MS);
        assert_eq!(frames_for(design.effective_duration_ms(), 30), 150);
        assert_eq!(design.size, Size::default());
        assert_eq!(design.fps, DEFAULT_FPS);
    }

    #[test]
    fn zero_length_items_use_stated_duration() {
        let design = Design::from_value(json!({
            "duration": 2000,
            "trackItemsMap": {"a": {"display": {"from": 0}}}
        }))
        .expect("valid design");

        assert_eq!(design.effective_duration_ms(), 2000.0);
    }

    #[test]
    fn zero_stated_duration_is_treated_as_absent() {
        let design = Design::from_value(json!({"duration": 0})).expect("valid design");
        assert_eq!(design.effective_duration_ms(), DEFAULT_DURATION_MS);
    }

    #[test]
    fn frame_count_never_drops_below_one() {
        assert_eq!(frames_for(0.0, 30), 1);
        assert_eq!(frames_for(-250.0, 30), 1);
        assert_eq!(frames_for(f64::NAN, 30), 1);
        assert_eq!(frames_for(1.0, 30), 1);
        assert_eq!(frames_for(1001.0, 30), 31);
    }

    #[test]
    fn rejects_negative_item_end() {
        let err = Design::from_value(json!({
            "trackItemsMap": {"a": {"display": {"from": 1000, "to": -1}}}
        }))
        .expect_err("negative end time");
        assert!(err.to_string().contains("track item `a`"));
    }

    #[test]
    fn zero_end_time_falls_back_to_item_duration() {
        let design = Design::from_value(json!({
            "trackItemsMap": {
                "a": {"display": {"from": 1000, "to": 0}, "details": {"duration": 2000}}
            }
        }))
        .expect("valid design");

        assert_eq!(design.effective_duration_ms(), 3000.0);
    }

    #[test]
    fn null_placement_fields_count_as_unset() {
        let design = Design::from_value(json!({
            "trackItemsMap": {
                "a": {"display": {"from": null, "to": 2000}},
                "b": {"display": null, "details": null}
            }
        }))
        .expect("valid design");

        assert_eq!(design.track_items_map["a"].end_ms(), 2000.0);
        assert_eq!(design.track_items_map["b"].end_ms(), 0.0);
        assert_eq!(design.effective_duration_ms(), 2000.0);
    }

    #[test]
    fn accepts_whole_floats_for_fps_and_size() {
        let design = Design::from_value(json!({
            "fps": 30.0,
            "size": {"width": 1280.0, "height": 720}
        }))
        .expect("valid design");

        assert_eq!(design.fps, 30);
        assert_eq!(design.size, Size { width: 1280, height: 720 });

        let design = Design::from_value(json!({"fps": null, "size": null})).expect("valid design");
        assert_eq!(design.fps, DEFAULT_FPS);
        assert_eq!(design.size, Size::default());
    }

    #[test]
    fn rejects_negative_fps() {
        let err = Design::from_value(json!({"fps": -24})).expect_err("negative fps");
        assert!(err.to_string().contains("non-negative integer"), "{err}");
    }

    #[test]
    fn rejects_non_object_documents() {
        let err = Design::from_value(json!("not a design")).expect_err("string design");
        assert!(err.to_string().contains("invalid design document"));
    }

    #[test]
    fn keeps_renderer_owned_item_details() {
        let design = Design::from_value(json!({
            "trackItemsMap": {
                "clip": {
                    "type": "video",
                    "display": {"from": 0, "to": 1000},
                    "details": {"src": "https://cdn.example.com/clip.mp4", "volume": 80}
                }
            },
            "background": {"type": "color", "value": "#000000"}
        }))
        .expect("valid design");

        let item = &design.track_items_map["clip"];
        assert_eq!(item.kind.as_deref(), Some("video"));
        assert_eq!(
            item.details.extra.get("src"),
            Some(&json!("https://cdn.example.com/clip.mp4"))
        );
        assert_eq!(design.background, Background::Color("#000000".to_string()));

        let round_trip = serde_json::to_value(&design).expect("serialize");
        assert_eq!(
            round_trip["trackItemsMap"]["clip"]["details"]["volume"],
            json!(80)
        );
    }
}

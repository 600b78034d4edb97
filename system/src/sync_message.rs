use crate::{Error, Stroke, StrokeId, StrokeKind};
use serde_json::{Map, Value};

/// Operations carried over the peer-to-peer sync channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Stroke(Stroke),
    Undo { stroke_id: StrokeId },
    Clear,
    /// Inbound only. Older peers tag redone strokes explicitly.
    Redo(Stroke),
}

const TYPE_KEY: &str = "type";

impl SyncMessage {
    /// Always emits the explicit `stroke` tag, never the bare legacy form.
    pub fn encode(&self) -> Result<String, Error> {
        let value = match self {
            SyncMessage::Stroke(stroke) => tagged_stroke("stroke", stroke)?,
            SyncMessage::Redo(stroke) => tagged_stroke("redo", stroke)?,
            SyncMessage::Undo { stroke_id } => serde_json::json!({
                "type": "undo",
                "strokeId": stroke_id,
            }),
            SyncMessage::Clear => serde_json::json!({ "type": "clear" }),
        };
        Ok(value.to_string())
    }

    pub fn decode(text: &str) -> Result<SyncMessage, Error> {
        let mut object = match serde_json::from_str::<Value>(text)? {
            Value::Object(object) => object,
            other => {
                return Err(Error::MalformedMessage(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };
        let tag = match object.remove(TYPE_KEY) {
            Some(Value::String(tag)) => tag,
            Some(other) => {
                return Err(Error::MalformedMessage(format!("bad type tag: {}", other)))
            }
            None => return Err(Error::MalformedMessage("missing type tag".into())),
        };

        match tag.as_str() {
            "stroke" => Ok(SyncMessage::Stroke(parse_stroke(object)?)),
            "redo" => Ok(SyncMessage::Redo(parse_stroke(object)?)),
            "undo" => {
                let stroke_id = object
                    .remove("strokeId")
                    .ok_or_else(|| Error::MalformedMessage("undo without strokeId".into()))?;
                Ok(SyncMessage::Undo {
                    stroke_id: serde_json::from_value(stroke_id)?,
                })
            }
            "clear" => Ok(SyncMessage::Clear),
            legacy if StrokeKind::from_tag(legacy).is_some() => {
                // bare stroke, kind carried in `type`
                object.insert("kind".into(), Value::String(tag.clone()));
                Ok(SyncMessage::Stroke(parse_stroke(object)?))
            }
            unknown => Err(Error::MalformedMessage(format!(
                "unknown sync message type: {}",
                unknown
            ))),
        }
    }
}

fn tagged_stroke(tag: &str, stroke: &Stroke) -> Result<Value, Error> {
    let mut value = serde_json::to_value(stroke)?;
    if let Value::Object(object) = &mut value {
        object.insert(TYPE_KEY.into(), Value::String(tag.into()));
    }
    Ok(value)
}

fn parse_stroke(object: Map<String, Value>) -> Result<Stroke, Error> {
    Ok(serde_json::from_value(Value::Object(object))?)
}

//! Line-delimited JSON messages exchanged with the worker.
//!
//! Each request is one JSON object on one line; each response is one JSON
//! object serialized without embedded newlines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TtsError;
use crate::synth::{Synthesis, SynthesisJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Generate,
    Ping,
    Exit,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub lang_code: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl Request {
    /// Parse one request line. Text that is not JSON at all is reported
    /// differently from JSON that does not fit the request shape.
    pub fn parse(line: &str) -> Result<Self, TtsError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|_| TtsError::InvalidJson)?;
        serde_json::from_value(value).map_err(|e| TtsError::InvalidRequest(e.to_string()))
    }

    /// Builds a synthesis job when all four generate fields are present and
    /// non-empty.
    pub fn to_job(&self) -> Result<SynthesisJob, TtsError> {
        fn required(field: &Option<String>) -> Result<&str, TtsError> {
            match field.as_deref() {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(TtsError::MissingRequiredParameters),
            }
        }

        Ok(SynthesisJob {
            text: required(&self.text)?.to_string(),
            voice: required(&self.voice)?.to_string(),
            lang_code: required(&self.lang_code)?.to_string(),
            output_path: PathBuf::from(required(&self.output_path)?),
        })
    }
}

/// A response line. Exactly one shape is populated per outcome, and `error`
/// is never set together with `success: true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    fn empty(success: bool) -> Self {
        Self {
            success,
            output_path: None,
            duration: None,
            sample_rate: None,
            error: None,
            message: None,
        }
    }

    pub fn generated(synthesis: &Synthesis) -> Self {
        Self {
            output_path: Some(synthesis.output_path.to_string_lossy().into_owned()),
            duration: Some(synthesis.duration),
            sample_rate: Some(synthesis.sample_rate),
            ..Self::empty(true)
        }
    }

    pub fn pong() -> Self {
        Self {
            message: Some("pong".to_string()),
            ..Self::empty(true)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(false)
        }
    }

    /// Serializes to a single line terminated by `\n`. serde_json escapes
    /// control characters inside strings, so the body never spans lines.
    pub fn to_line(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"success\":false,\"error\":{}}}",
                serde_json::Value::String(e.to_string())
            )
        });
        format!("{json}\n")
    }
}

impl From<&TtsError> for Response {
    fn from(err: &TtsError) -> Self {
        Self::failure(err.to_string())
    }
}

impl From<Result<Synthesis, TtsError>> for Response {
    fn from(result: Result<Synthesis, TtsError>) -> Self {
        match result {
            Ok(synthesis) => Self::generated(&synthesis),
            Err(err) => Self::from(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SAMPLE_RATE;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_parse_generate_request() {
        let request = Request::parse(
            r#"{"action":"generate","text":"Hola","voice":"ef_dora","lang_code":"e","output_path":"/tmp/a.wav"}"#,
        )
        .unwrap();
        assert_eq!(request.action, Some(Action::Generate));

        let job = request.to_job().unwrap();
        assert_eq!(job.text, "Hola");
        assert_eq!(job.voice, "ef_dora");
        assert_eq!(job.lang_code, "e");
        assert_eq!(job.output_path, PathBuf::from("/tmp/a.wav"));
    }

    #[test]
    fn test_unrecognized_action_parses_as_unknown() {
        let request = Request::parse(r#"{"action":"dance"}"#).unwrap();
        assert_eq!(request.action, Some(Action::Unknown));

        let request = Request::parse(r#"{}"#).unwrap();
        assert_eq!(request.action, None);
    }

    #[test]
    fn test_non_json_is_invalid_json() {
        let err = Request::parse("not json").unwrap_err();
        assert!(matches!(err, TtsError::InvalidJson));
    }

    #[rstest]
    #[case::array("[1, 2]")]
    #[case::number("42")]
    #[case::wrong_field_type(r#"{"action":"generate","text":5}"#)]
    fn test_json_of_wrong_shape_is_invalid_request(#[case] line: &str) {
        let err = Request::parse(line).unwrap_err();
        assert!(
            matches!(err, TtsError::InvalidRequest(_)),
            "unexpected error for {line}: {err:?}"
        );
    }

    #[rstest]
    #[case::nothing(r#"{"action":"generate"}"#)]
    #[case::no_text(r#"{"action":"generate","voice":"af","lang_code":"a","output_path":"o.wav"}"#)]
    #[case::empty_voice(r#"{"action":"generate","text":"hi","voice":"","lang_code":"a","output_path":"o.wav"}"#)]
    #[case::null_lang(r#"{"action":"generate","text":"hi","voice":"af","lang_code":null,"output_path":"o.wav"}"#)]
    #[case::no_output(r#"{"action":"generate","text":"hi","voice":"af","lang_code":"a"}"#)]
    fn test_generate_requires_all_fields(#[case] line: &str) {
        let request = Request::parse(line).unwrap();
        let err = request.to_job().unwrap_err();
        assert!(matches!(err, TtsError::MissingRequiredParameters));
    }

    #[test]
    fn test_success_response_shape() {
        let synthesis = Synthesis {
            output_path: PathBuf::from("/tmp/out.wav"),
            duration: 1.5,
            sample_rate: SAMPLE_RATE,
        };
        let value: serde_json::Value =
            serde_json::from_str(&Response::generated(&synthesis).to_line()).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "output_path": "/tmp/out.wav",
                "duration": 1.5,
                "sample_rate": 24000
            })
        );
    }

    #[test]
    fn test_pong_and_failure_shapes() {
        assert_eq!(
            Response::pong().to_line(),
            "{\"success\":true,\"message\":\"pong\"}\n"
        );
        assert_eq!(
            Response::from(&TtsError::UnknownAction).to_line(),
            "{\"success\":false,\"error\":\"Unknown action\"}\n"
        );
    }

    #[test]
    fn test_multiline_error_stays_on_one_line() {
        let line = Response::failure("engine said:\nline one\nline two").to_line();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["error"], "engine said:\nline one\nline two");
    }
}

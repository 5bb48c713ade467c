//! Serde helpers for frame decoding.
//!
//! When the `tracing` feature is enabled, decoding also logs warnings for any
//! unknown fields in a frame and the exact path at which a frame failed to decode,
//! helping detect changes in what the remote service broadcasts.

use serde::de::DeserializeOwned;

/// Deserialize a JSON frame with unknown field warnings.
///
/// Unknown fields trigger warnings but do not cause deserialization to fail.
///
/// # Example
///
/// ```ignore
/// let frame = r#"{"heavyVehicles": 2, "lightVehicles": 5, "lane": "north"}"#;
/// let counts: DetectionCounts = deserialize_with_warnings(frame)?;
/// // Logs: WARN unknown field "lane" in DetectionCounts
/// ```
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(
    frame: &str,
) -> Result<T, serde_json::Error> {
    use std::any::type_name;

    tracing::trace!(type_name = %type_name::<T>(), %frame, "deserializing frame");

    let mut unknown_paths: Vec<String> = Vec::new();
    let de = &mut serde_json::Deserializer::from_str(frame);

    let result: T = serde_ignored::deserialize(&mut *de, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        // Decode again with serde_path_to_error to find where it broke
        let retry = &mut serde_json::Deserializer::from_str(frame);
        if let Err(path_err) = serde_path_to_error::deserialize::<_, T>(retry) {
            tracing::warn!(
                type_name = %type_name::<T>(),
                path = %path_err.path(),
                error = %path_err.inner(),
                "frame decode failed"
            );
        }
    })?;
    de.end()?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            "unknown field in frame"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(
    frame: &str,
) -> Result<T, serde_json::Error> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::deserialize_with_warnings;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestStruct {
        known_field: String,
        #[serde(default)]
        optional_field: Option<i32>,
    }

    #[test]
    fn deserialize_known_fields_only() {
        let result: TestStruct =
            deserialize_with_warnings(r#"{"known_field":"value","optional_field":42}"#)
                .expect("deserialization failed");

        assert_eq!(result.known_field, "value");
        assert_eq!(result.optional_field, Some(42));
    }

    #[test]
    fn deserialize_with_unknown_fields() {
        let result: TestStruct =
            deserialize_with_warnings(r#"{"known_field":"value","extra":[1,2]}"#)
                .expect("unknown fields should not fail");

        assert_eq!(result.known_field, "value");
        assert_eq!(result.optional_field, None);
    }

    #[test]
    fn deserialize_rejects_trailing_garbage() {
        let result: Result<TestStruct, _> =
            deserialize_with_warnings(r#"{"known_field":"value"} trailing"#);

        assert!(result.is_err());
    }

    #[test]
    fn deserialize_reports_missing_field() {
        let result: Result<TestStruct, _> = deserialize_with_warnings(r#"{"optional_field":1}"#);

        let err = result.unwrap_err();
        assert!(err.to_string().contains("known_field"));
    }
}

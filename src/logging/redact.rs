use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const TS_ZERO: &str = "1970-01-01T00:00:00Z";

#[must_use]
pub fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| TS_ZERO.to_string())
}

/// Apply redactions to a fact so runs can be compared.
/// Zeroes timestamps and removes volatile timings and runtime-dependent flags.
#[must_use]
pub fn redact_event(mut v: Value) -> Value {
    if let Some(obj) = v.as_object_mut() {
        obj.insert("ts".into(), Value::String(TS_ZERO.to_string()));
        obj.remove("duration_ms");
        obj.remove("elapsed_ms");
        obj.remove("budget_ms");
        obj.remove("attempts");
        obj.remove("degraded");
        obj.remove("tx_id");
        obj.remove("snapshot_id");
        if let Some(files) = obj.get_mut("files").and_then(Value::as_array_mut) {
            for f in files.iter_mut() {
                if let Some(fo) = f.as_object_mut() {
                    fo.remove("sha256");
                }
            }
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redact_masks_and_removes_expected_fields() {
        let input = json!({
            "ts": "2025-01-01T12:00:00Z",
            "tx_id": "abc",
            "duration_ms": 123,
            "elapsed_ms": 7,
            "degraded": true,
            "files": [{"path": "/x", "sha256": "beef"}],
            "stage": "swap.stop"
        });
        let out = redact_event(input);
        assert_eq!(out.get("ts").and_then(|v| v.as_str()), Some(TS_ZERO));
        assert!(out.get("tx_id").is_none());
        assert!(out.get("duration_ms").is_none());
        assert!(out.get("elapsed_ms").is_none());
        assert!(out.get("degraded").is_none());
        assert!(out["files"][0].get("sha256").is_none());
        assert_eq!(out["stage"], json!("swap.stop"));
    }

    #[test]
    fn now_iso_is_rfc3339() {
        let ts = now_iso();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}

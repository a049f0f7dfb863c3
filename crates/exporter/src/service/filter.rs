use crate::conf::MetricsConfig;
use crate::parser::{KnownField, LogFields};

/// Drop the fields whose metric is disabled, so they never reach
/// relabeling or aggregation.
pub fn filter_fields(fields: &mut LogFields, metrics: &MetricsConfig) {
    let disabled = [
        (KnownField::BodyBytesSent, metrics.disable_response_bytes_total),
        (KnownField::RequestLength, metrics.disable_request_bytes_total),
        (KnownField::UpstreamResponseTime, metrics.disable_upstream_seconds),
        (KnownField::UpstreamConnectTime, metrics.disable_upstream_connect_seconds),
        (KnownField::RequestTime, metrics.disable_response_seconds),
    ];

    for (field, off) in disabled {
        if off {
            fields.remove_known(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_line() -> LogFields {
        [
            ("status", "200"),
            ("body_bytes_sent", "512"),
            ("request_length", "80"),
            ("upstream_response_time", "0.01"),
            ("upstream_connect_time", "0.001"),
            ("request_time", "0.02"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_nothing_disabled_keeps_all_fields() {
        let mut fields = full_line();
        filter_fields(&mut fields, &MetricsConfig::default());
        assert_eq!(fields, full_line());
    }

    #[test]
    fn test_each_flag_removes_its_field() {
        let cases: [(fn(&mut MetricsConfig), KnownField); 5] = [
            (|m| m.disable_response_bytes_total = true, KnownField::BodyBytesSent),
            (|m| m.disable_request_bytes_total = true, KnownField::RequestLength),
            (|m| m.disable_upstream_seconds = true, KnownField::UpstreamResponseTime),
            (|m| m.disable_upstream_connect_seconds = true, KnownField::UpstreamConnectTime),
            (|m| m.disable_response_seconds = true, KnownField::RequestTime),
        ];

        for (disable, field) in cases {
            let mut metrics = MetricsConfig::default();
            disable(&mut metrics);
            let mut fields = full_line();
            filter_fields(&mut fields, &metrics);

            assert!(fields.known(field).is_none(), "{} should be removed", field.as_str());
            assert_eq!(fields.len(), 5);
        }
    }

    #[test]
    fn test_count_total_flag_does_not_touch_fields() {
        let metrics = MetricsConfig {
            disable_count_total: true,
            ..Default::default()
        };
        let mut fields = full_line();
        filter_fields(&mut fields, &metrics);
        assert_eq!(fields.known(KnownField::Status), Some("200"));
        assert_eq!(fields.len(), 6);
    }
}

//! XML body serialization for the file and blob REST APIs.

use crate::models::{
    CorsRule, DirectoryEntry, EntryKind, FileServiceProperties, MetricsConfig, ShareStats,
    SignedIdentifier,
};

/// Escapes special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes file service properties (metrics and CORS).
pub fn serialize_service_properties(props: &FileServiceProperties) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<StorageServiceProperties>");

    xml.push_str(&serialize_metrics("HourMetrics", &props.hour_metrics));
    xml.push_str(&serialize_metrics("MinuteMetrics", &props.minute_metrics));

    xml.push_str("<Cors>");
    for rule in &props.cors {
        xml.push_str(&serialize_cors_rule(rule));
    }
    xml.push_str("</Cors>");

    xml.push_str("</StorageServiceProperties>");
    xml
}

fn serialize_metrics(element: &str, metrics: &MetricsConfig) -> String {
    let mut xml = format!("<{}>", element);
    xml.push_str(&format!("<Version>{}</Version>", xml_escape(&metrics.version)));
    xml.push_str(&format!("<Enabled>{}</Enabled>", metrics.level.enabled()));
    // IncludeAPIs is only allowed when metrics are enabled
    if metrics.level.enabled() {
        xml.push_str(&format!(
            "<IncludeAPIs>{}</IncludeAPIs>",
            metrics.level.include_apis()
        ));
    }
    xml.push_str("<RetentionPolicy>");
    match metrics.retention_days {
        Some(days) => {
            xml.push_str("<Enabled>true</Enabled>");
            xml.push_str(&format!("<Days>{}</Days>", days));
        }
        None => xml.push_str("<Enabled>false</Enabled>"),
    }
    xml.push_str("</RetentionPolicy>");
    xml.push_str(&format!("</{}>", element));
    xml
}

fn serialize_cors_rule(rule: &CorsRule) -> String {
    let mut xml = String::from("<CorsRule>");
    xml.push_str(&format!(
        "<AllowedOrigins>{}</AllowedOrigins>",
        xml_escape(&rule.allowed_origins.join(","))
    ));
    xml.push_str(&format!(
        "<AllowedMethods>{}</AllowedMethods>",
        xml_escape(&rule.allowed_methods.join(","))
    ));
    xml.push_str(&format!(
        "<AllowedHeaders>{}</AllowedHeaders>",
        xml_escape(&rule.allowed_headers.join(","))
    ));
    xml.push_str(&format!(
        "<ExposedHeaders>{}</ExposedHeaders>",
        xml_escape(&rule.exposed_headers.join(","))
    ));
    xml.push_str(&format!(
        "<MaxAgeInSeconds>{}</MaxAgeInSeconds>",
        rule.max_age_in_seconds
    ));
    xml.push_str("</CorsRule>");
    xml
}

/// Serializes a stored access policy set.
pub fn serialize_signed_identifiers(identifiers: &[SignedIdentifier]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<SignedIdentifiers>");
    for identifier in identifiers {
        let policy = &identifier.policy;
        xml.push_str("<SignedIdentifier>");
        xml.push_str(&format!("<Id>{}</Id>", xml_escape(&identifier.id)));
        xml.push_str("<AccessPolicy>");
        if let Some(ref start) = policy.start {
            xml.push_str(&format!(
                "<Start>{}</Start>",
                start.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }
        xml.push_str(&format!(
            "<Expiry>{}</Expiry>",
            policy.expiry.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        xml.push_str(&format!("<Permission>{}</Permission>", policy.permissions));
        xml.push_str("</AccessPolicy>");
        xml.push_str("</SignedIdentifier>");
    }
    xml.push_str("</SignedIdentifiers>");
    xml
}

/// Serializes share usage statistics.
pub fn serialize_share_stats(stats: &ShareStats) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><ShareStats><ShareUsageBytes>{}</ShareUsageBytes></ShareStats>"#,
        stats.usage_bytes
    )
}

/// Serializes the entries of one directory.
pub fn serialize_directory_listing(
    endpoint: &str,
    share: &str,
    directory_path: &str,
    entries: &[DirectoryEntry],
) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<EnumerationResults ServiceEndpoint="{}" ShareName="{}" DirectoryPath="{}">"#,
        xml_escape(endpoint),
        xml_escape(share),
        xml_escape(directory_path)
    ));
    xml.push_str("<Entries>");
    for entry in entries {
        match entry.kind {
            EntryKind::File { content_length } => {
                xml.push_str("<File>");
                xml.push_str(&format!("<Name>{}</Name>", xml_escape(&entry.name)));
                xml.push_str(&format!(
                    "<Properties><Content-Length>{}</Content-Length></Properties>",
                    content_length
                ));
                xml.push_str("</File>");
            }
            EntryKind::Directory => {
                xml.push_str("<Directory>");
                xml.push_str(&format!("<Name>{}</Name>", xml_escape(&entry.name)));
                xml.push_str("<Properties /></Directory>");
            }
        }
    }
    xml.push_str("</Entries>");
    xml.push_str("<NextMarker /></EnumerationResults>");
    xml
}

/// Serializes an error body.
pub fn serialize_error(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>{}</Code><Message>{}</Message></Error>"#,
        xml_escape(code),
        xml_escape(message)
    )
}

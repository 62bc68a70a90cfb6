use scrubpdf::{
    config::{PatternConfig, ProcessingConfig, ScannerConfig},
    error::Error,
    pipeline::Pipeline,
    scanner::{Decoded, Location, ObfuscationScanner},
};

use crate::fixtures::{TestFixtures, SCRIPT_ACTION};

#[test]
fn test_percent_encoded_payload_is_unescaped() {
    let scanner = ObfuscationScanner::default();
    let findings: Vec<_> = scanner.scan(b"%6A%61%76%61%73%63%72%69%70%74").collect();

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.pattern, "percent-encoding");
    assert_eq!(finding.location, Location::Offset(0));
    assert_eq!(finding.decoded, Decoded::Unescaped(b"javascript".to_vec()));
}

#[test]
fn test_hex_run_is_decoded() {
    let scanner = ObfuscationScanner::default();
    let findings: Vec<_> = scanner.scan(b"6576616c2822616c65727428312922293b").collect();

    let hex = findings.iter().find(|f| f.pattern == "hex-run").unwrap();
    assert_eq!(hex.decoded, Decoded::Hex(b"eval(\"alert(1)\");".to_vec()));
}

#[test]
fn test_configured_pattern_decodes_base64() {
    let config = ScannerConfig {
        context_window: 8,
        patterns: vec![PatternConfig {
            name: "base64-blob".into(),
            regex: r"[A-Za-z0-9+/]{16,}={0,2}".into(),
        }],
        ..ScannerConfig::default()
    };
    let scanner = ObfuscationScanner::from_config(&config).unwrap();
    assert_eq!(scanner.patterns().len(), 1);

    let findings: Vec<_> = scanner.scan(b"ZXZhbCgiYWxlcnQoMSkiKQ==").collect();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].decoded, Decoded::Base64(b"eval(\"alert(1)\")".to_vec()));
}

#[test]
fn test_unmatched_context_is_undecodable() {
    let scanner = ObfuscationScanner::default();
    let findings: Vec<_> = scanner.scan(b"<script>run()</script>").collect();
    assert_eq!(findings[0].pattern, "script-tag");
    assert_eq!(findings[0].decoded, Decoded::Undecodable);
}

#[test]
fn test_findings_serialize_as_text() {
    let scanner = ObfuscationScanner::default();
    let finding = scanner.scan(b"%6A%61%76%61").next().unwrap();
    let json = serde_json::to_value(&finding).unwrap();

    assert_eq!(json["pattern"], "percent-encoding");
    assert_eq!(json["matched"], "%6A%61%76%61");
    assert_eq!(json["decoded"]["encoding"], "unescape");
    assert_eq!(json["decoded"]["text"], "java");
}

#[test]
fn test_object_mode_reports_object_ids() {
    let doc = TestFixtures::active_document();
    let findings = ObfuscationScanner::default().scan_document(&doc);

    let in_action: Vec<_> = findings
        .iter()
        .filter(|f| matches!(f.location, Location::Object { id, .. } if id == SCRIPT_ACTION))
        .map(|f| f.pattern.as_str())
        .collect();
    assert!(in_action.contains(&"js-name"));
}

#[tokio::test]
async fn test_scan_reads_file_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let pipeline = Pipeline::new(ProcessingConfig::default()).unwrap();

    let report = pipeline.scan(&input).await.unwrap();
    assert!(report.raw.iter().any(|f| f.pattern == "js-name"));
    assert!(report.objects.iter().any(|f| f.pattern == "js-name"));
    assert!(!dir.path().join("active_clean.pdf").exists());

    let again = pipeline.scan(&input).await.unwrap();
    assert_eq!(report.raw, again.raw);
}

#[tokio::test]
async fn test_scan_rejects_non_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.html");
    std::fs::write(&path, b"<html><script>eval(x)</script></html>").unwrap();
    let pipeline = Pipeline::new(ProcessingConfig::default()).unwrap();

    assert!(matches!(
        pipeline.scan(&path).await,
        Err(Error::NotADocument(_))
    ));
}

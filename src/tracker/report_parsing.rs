use crate::io_models::job::TestResultStatus;
use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("Malformed test report: {raw_error_message:?}.")]
    Malformed { raw_error_message: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTestResult {
    pub name: String,
    pub status: TestResultStatus,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

/// Extract every `<test>` element of a runner report. Unparseable duration
/// attributes default to 0; a document that does not parse at all is an
/// error the caller downgrades to zero counts.
pub fn parse_test_results(xml: &str) -> Result<Vec<ParsedTestResult>, ReportParseError> {
    let document = roxmltree::Document::parse(xml).map_err(|e| ReportParseError::Malformed {
        raw_error_message: e.to_string(),
    })?;

    let mut tests = Vec::new();
    for node in document.descendants().filter(|node| node.has_tag_name("test")) {
        let failure = node.children().find(|child| child.has_tag_name("failure"));
        let child_text = |tag: &str| {
            failure
                .and_then(|failure| failure.children().find(|child| child.has_tag_name(tag)))
                .and_then(|child| child.text())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };

        tests.push(ParsedTestResult {
            name: node.attribute("name").unwrap_or_default().to_string(),
            status: normalize_status(node.attribute("result").unwrap_or_default()),
            duration_seconds: node
                .attribute("duration")
                .and_then(|duration| duration.parse::<f64>().ok())
                .unwrap_or(0.0),
            error_message: child_text("message"),
            stack_trace: child_text("stack-trace"),
        });
    }

    Ok(tests)
}

fn normalize_status(raw: &str) -> TestResultStatus {
    match raw.to_lowercase().as_str() {
        "pass" | "passed" => TestResultStatus::Passed,
        "fail" | "failed" => TestResultStatus::Failed,
        "skip" | "skipped" | "ignored" => TestResultStatus::Skipped,
        _ => TestResultStatus::Unknown,
    }
}

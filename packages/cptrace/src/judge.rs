//! Sample-case checking and random stress inputs.
//!
//! Cases live in a TOML file as a `[[cases]]` array:
//!
//! ```toml
//! [[cases]]
//! name = "sample 1"
//! input = "3\n1 2 3\n"
//! expected = "6"
//! ```

use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub name: Option<String>,
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            name: None,
            input: input.into(),
            expected: expected.into(),
        }
    }

    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("case {}", index + 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub expected: String,
    /// Trimmed output, or `Error: <message>` when the program raised
    pub actual: String,
    pub status: TestStatus,
    pub elapsed_ms: u128,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

/// Compare one run against its case.
pub fn judge(case: &TestCase, index: usize, stdout: &str, error: Option<&str>, elapsed_ms: u128) -> TestResult {
    let (actual, status) = match error {
        Some(message) => (format!("Error: {}", message), TestStatus::Fail),
        None => {
            let actual = stdout.trim().to_string();
            let status = if actual == case.expected.trim() {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            };
            (actual, status)
        }
    };
    TestResult {
        name: case.label(index),
        expected: case.expected.trim().to_string(),
        actual,
        status,
        elapsed_ms,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressFailure {
    pub input: String,
    pub actual: String,
    /// Reference output, when a reference program was given
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressReport {
    pub seed: u64,
    pub iterations: usize,
    pub passed: usize,
    pub failed: usize,
    pub first_failure: Option<StressFailure>,
}

/// An array problem input: a length `n` in 1..=100 on the first line, then
/// `n` values in 0..1000.
pub fn random_input<R: Rng>(rng: &mut R) -> String {
    let n = rng.gen_range(1..=100);
    let values: Vec<String> = (0..n).map(|_| rng.gen_range(0..1000).to_string()).collect();
    format!("{}\n{}", n, values.join(" "))
}

#[derive(Deserialize)]
struct CaseFile {
    #[serde(default)]
    cases: Vec<TestCase>,
}

pub fn parse_cases(path: &Path, content: &str) -> Result<Vec<TestCase>, ConfigError> {
    toml::from_str::<CaseFile>(content)
        .map(|file| file.cases)
        .map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

pub fn load_cases(path: &Path) -> Result<Vec<TestCase>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_cases(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_judge_trims_both_sides() {
        let case = TestCase::new("", "6\n");
        let result = judge(&case, 0, "  6\n\n", None, 1);
        assert!(result.passed());
        assert_eq!(result.name, "case 1");
        assert_eq!(result.actual, "6");

        let result = judge(&case, 2, "7\n", None, 1);
        assert_eq!(result.status, TestStatus::Fail);
        assert_eq!(result.name, "case 3");
    }

    #[test]
    fn test_judge_error_fails_with_message() {
        let case = TestCase::new("", "Error: boom");
        let result = judge(&case, 0, "", Some("ValueError: boom"), 0);
        assert_eq!(result.status, TestStatus::Fail);
        assert_eq!(result.actual, "Error: ValueError: boom");
    }

    #[test]
    fn test_random_input_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let input = random_input(&mut rng);
            let (first, rest) = input.split_once('\n').unwrap();
            let n: usize = first.parse().unwrap();
            assert!((1..=100).contains(&n));
            let values: Vec<u32> = rest.split(' ').map(|v| v.parse().unwrap()).collect();
            assert_eq!(values.len(), n);
            assert!(values.iter().all(|v| *v < 1000));
        }
        let again = random_input(&mut StdRng::seed_from_u64(7));
        assert_eq!(again, random_input(&mut StdRng::seed_from_u64(7)));
    }

    #[test]
    fn test_parse_cases() {
        let content = "[[cases]]\nname = \"sample\"\ninput = \"1 2\\n\"\nexpected = \"3\"\n\n[[cases]]\ninput = \"\"\nexpected = \"0\"\n";
        let cases = parse_cases(Path::new("cases.toml"), content).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].label(0), "sample");
        assert_eq!(cases[1].label(1), "case 2");
        assert!(parse_cases(Path::new("cases.toml"), "[[cases]]\ninput = 1\n").is_err());
    }
}

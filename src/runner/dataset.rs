//! Benchmark datasets: the questions to run and their recorded transcripts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DatasetError;

/// One benchmark question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCase {
    pub question: String,
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub requires_visualization: bool,
    /// JSONL file of raw events, relative to the dataset file.
    pub transcript: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YamlDataset {
    List(Vec<BenchmarkCase>),
    Wrapped { cases: Vec<BenchmarkCase> },
}

/// Loads cases from a `.yaml`/`.yml` file (a list, or a map with `cases`)
/// or from a JSON Lines file.
///
/// Relative transcript paths are resolved against the dataset's directory.
pub fn load_dataset(path: &Path) -> Result<Vec<BenchmarkCase>, DatasetError> {
    let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let mut cases = if is_yaml {
        parse_yaml_cases(&content)?
    } else {
        parse_jsonl_cases(&content)?
    };
    if cases.is_empty() {
        return Err(DatasetError::Empty);
    }

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for case in &mut cases {
        if case.transcript.is_relative() {
            case.transcript = base.join(&case.transcript);
        }
    }

    info!(path = %path.display(), cases = cases.len(), "Loaded dataset");
    Ok(cases)
}

pub fn parse_yaml_cases(content: &str) -> Result<Vec<BenchmarkCase>, DatasetError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_yaml::from_str::<YamlDataset>(content)? {
        YamlDataset::List(cases) => cases,
        YamlDataset::Wrapped { cases } => cases,
    })
}

/// Parses one case per non-blank line.
pub fn parse_jsonl_cases(content: &str) -> Result<Vec<BenchmarkCase>, DatasetError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| DatasetError::InvalidEntry {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Parses a row selection such as `"1,3-5,10"` into sorted, deduplicated
/// 1-based indices.
///
/// Ranges are cut off at `total`, the number of dataset rows. Unparseable
/// parts are skipped with a warning. Returns `None` when nothing valid
/// remains.
pub fn parse_row_indices(selection: &str, total: usize) -> Option<Vec<usize>> {
    let mut indices = Vec::new();
    for part in selection.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = match part.split_once('-') {
            Some((start, end)) => match (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                (Ok(start), Ok(end)) => {
                    if end > total {
                        warn!(part, total, "Row range extends past the dataset, clamping");
                    }
                    Some((start.max(1)..=end.min(total)).collect::<Vec<_>>())
                }
                _ => None,
            },
            None => part.parse::<usize>().ok().map(|i| vec![i]),
        };
        match parsed {
            Some(values) => indices.extend(values),
            None => warn!(part, "Invalid row index, skipping"),
        }
    }

    indices.sort_unstable();
    indices.dedup();
    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

/// Picks the cases to run, paired with their 1-based dataset index.
///
/// An explicit row selection wins over `limit`; rows past the end of the
/// dataset are ignored with a warning. A non-empty `questions` list keeps
/// only cases whose question text equals one of its entries.
pub fn select_cases(
    cases: Vec<BenchmarkCase>,
    row_indices: Option<&[usize]>,
    questions: &[String],
    limit: Option<usize>,
) -> Vec<(usize, BenchmarkCase)> {
    let total = cases.len();
    let numbered = cases
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i + 1, c))
        .filter(|(_, c)| questions.is_empty() || questions.contains(&c.question));

    let selected: Vec<_> = match row_indices {
        Some(rows) => {
            let out_of_range: Vec<usize> = rows.iter().copied().filter(|&r| r == 0 || r > total).collect();
            if !out_of_range.is_empty() {
                warn!(?out_of_range, total, "Row indices outside the dataset were ignored");
            }
            numbered.filter(|(i, _)| rows.contains(i)).collect()
        }
        None => numbered.take(limit.unwrap_or(total)).collect(),
    };
    if !questions.is_empty() {
        info!(requested = questions.len(), matched = selected.len(), "Filtered by question text");
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case(question: &str) -> BenchmarkCase {
        BenchmarkCase {
            question: question.to_string(),
            expected_answer: String::new(),
            requires_visualization: false,
            transcript: PathBuf::from("t.jsonl"),
        }
    }

    #[test]
    fn test_parse_row_indices() {
        assert_eq!(parse_row_indices("1,3-5,10", 20), Some(vec![1, 3, 4, 5, 10]));
        assert_eq!(parse_row_indices("5, 2-3 ,3", 20), Some(vec![2, 3, 5]));
        assert_eq!(parse_row_indices("x,2", 20), Some(vec![2]));
        assert_eq!(parse_row_indices("a-b", 20), None);
        assert_eq!(parse_row_indices("", 20), None);
    }

    #[test]
    fn test_oversized_range_is_clamped_to_dataset() {
        assert_eq!(
            parse_row_indices("1-18446744073709551615", 3),
            Some(vec![1, 2, 3])
        );
        assert_eq!(parse_row_indices("0-2", 3), Some(vec![1, 2]));
        assert_eq!(parse_row_indices("5-9", 3), None);
        assert_eq!(parse_row_indices("2-9,7", 3), Some(vec![2, 3, 7]));
    }

    #[test]
    fn test_select_cases() {
        let cases: Vec<_> = ["a", "b", "c", "d"].into_iter().map(case).collect();

        let limited = select_cases(cases.clone(), None, &[], Some(2));
        assert_eq!(limited.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2]);

        let picked = select_cases(cases.clone(), Some(&[2, 4, 9]), &[], Some(1));
        assert_eq!(picked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(picked[1].1.question, "d");

        assert_eq!(select_cases(cases, None, &[], None).len(), 4);
    }

    #[test]
    fn test_select_cases_by_question_text() {
        let cases: Vec<_> = ["a", "b", "c", "d"].into_iter().map(case).collect();
        let wanted = vec!["c".to_string(), "a".to_string(), "zzz".to_string()];

        let matched = select_cases(cases.clone(), None, &wanted, None);
        assert_eq!(matched.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(matched[1].1.question, "c");

        let combined = select_cases(cases.clone(), Some(&[1, 2]), &wanted, None);
        assert_eq!(combined.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1]);

        let limited = select_cases(cases, None, &wanted, Some(1));
        assert_eq!(limited.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_load_yaml_dataset_resolves_transcripts() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("bench.yaml");
        std::fs::write(
            &path,
            "cases:\n  - question: How many?\n    expected_answer: One\n    transcript: runs/q1.jsonl\n",
        )
        .expect("write dataset");

        let cases = load_dataset(&path).expect("dataset should load");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].transcript, dir.path().join("runs/q1.jsonl"));
        assert!(!cases[0].requires_visualization);
    }

    #[test]
    fn test_load_jsonl_dataset() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("bench.jsonl");
        std::fs::write(
            &path,
            "{\"question\":\"Q1\",\"transcript\":\"/abs/q1.jsonl\",\"requires_visualization\":true}\n\n",
        )
        .expect("write dataset");

        let cases = load_dataset(&path).expect("dataset should load");
        assert_eq!(cases[0].transcript, PathBuf::from("/abs/q1.jsonl"));
        assert!(cases[0].requires_visualization);
    }

    #[test]
    fn test_dataset_errors() {
        assert!(matches!(
            parse_jsonl_cases("{\"question\":\"Q\"}\n"),
            Err(DatasetError::InvalidEntry { line: 1, .. })
        ));

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "[]\n").expect("write");
        assert!(matches!(load_dataset(&path), Err(DatasetError::Empty)));
        assert!(matches!(
            load_dataset(&dir.path().join("missing.yaml")),
            Err(DatasetError::Read { .. })
        ));
    }
}

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::{CandidateIdentifier, Harvester, SourceTag, candidates_from};
use crate::error::Result;

/// Line-delimited identifier file. Blank lines and `#` comments are ignored.
pub struct FileHarvester {
    path: PathBuf,
}

impl FileHarvester {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub fn identifier_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[async_trait]
impl Harvester for FileHarvester {
    fn source(&self) -> SourceTag {
        SourceTag::File
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateIdentifier>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let candidates = candidates_from(identifier_lines(&contents), SourceTag::File);
        info!(path = %self.path.display(), count = candidates.len(), "read identifier file");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_identifiers_skipping_comments() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "# weekly list\n10.1101/2024.01.01.000001\n\n  https://doi.org/10.7554/eLife.1  \nnot a doi\n",
        )
        .unwrap();

        let candidates = FileHarvester::new(file.path()).fetch_candidates().await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["10.1101/2024.01.01.000001", "10.7554/elife.1"]);
        assert!(candidates.iter().all(|c| c.source == SourceTag::File));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let harvester = FileHarvester::new("/nonexistent/pubscope/ids.txt");
        assert!(harvester.fetch_candidates().await.is_err());
    }
}

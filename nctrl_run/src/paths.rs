//! Output directory layout

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RunError, RunResult};

#[derive(Debug, Clone)]
pub struct OutputPaths {
    out_dir: PathBuf,
}

impl OutputPaths {
    pub fn create(out_dir: impl Into<PathBuf>) -> RunResult<Self> {
        let paths = Self {
            out_dir: out_dir.into(),
        };
        let archives = paths.archive_dir();
        fs::create_dir_all(&archives).map_err(|e| RunError::io(&archives, e))?;
        Ok(paths)
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn baseline_energy(&self) -> PathBuf {
        self.out_dir.join("baseline_energy.csv")
    }

    pub fn perturbed_energy(&self) -> PathBuf {
        self.out_dir.join("perturbed_energy.csv")
    }

    pub fn rerc(&self) -> PathBuf {
        self.out_dir.join("rerc.csv")
    }

    pub fn subject_rerc(&self) -> PathBuf {
        self.out_dir.join("subject_rerc.csv")
    }

    pub fn group_rerc(&self) -> PathBuf {
        self.out_dir.join("group_rerc.csv")
    }

    pub fn subject_summary(&self) -> PathBuf {
        self.out_dir.join("subject_summary.csv")
    }

    pub fn failures(&self) -> PathBuf {
        self.out_dir.join("failures.csv")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.out_dir.join("archives")
    }

    /// One `.nce` archive per subject. Path separators in the id are replaced.
    pub fn archive(&self, subject: &str) -> PathBuf {
        let name: String = subject
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.archive_dir().join(format!("{name}.nce"))
    }
}

/// Resolve `path` against the directory of the file that referenced it.
pub fn resolve(base_file: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base_file.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_follow_the_referencing_file() {
        let base = Path::new("/data/study/study.json");
        assert_eq!(
            resolve(base, Path::new("sc/sub-01.csv")),
            PathBuf::from("/data/study/sc/sub-01.csv")
        );
        assert_eq!(
            resolve(base, Path::new("/abs/states.csv")),
            PathBuf::from("/abs/states.csv")
        );
    }

    #[test]
    fn archive_names_are_flat() {
        let paths = OutputPaths {
            out_dir: PathBuf::from("out"),
        };
        assert_eq!(
            paths.archive("site/sub-01"),
            PathBuf::from("out/archives/site_sub-01.nce")
        );
    }
}

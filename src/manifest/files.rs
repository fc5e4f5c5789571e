//! Dependency manifest readers
//!
//! Two formats are understood: a PEP 621 `pyproject.toml` and a flat
//! `requirements.txt`. Both produce the same [`Manifest`]. Anything the
//! reader does not understand is an error; entries are never skipped.

use super::error::ManifestError;
use super::requirement::Requirement;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    Pyproject,
    Requirements,
}

/// Declared dependencies of the application
#[derive(Debug, Clone)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub path: PathBuf,
    pub project_name: Option<String>,
    pub requires_python: Option<String>,
    pub dependencies: Vec<Requirement>,
}

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<ProjectTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProjectTable {
    name: Option<String>,
    requires_python: Option<String>,
    dependencies: Option<Vec<String>>,
}

impl Manifest {
    /// Choose a reader from the file name
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name == "pyproject.toml" {
            Self::from_pyproject(path, content)
        } else if file_name.ends_with(".txt") || file_name.ends_with(".in") {
            Self::from_requirements(path, content)
        } else {
            Err(ManifestError::UnknownManifest(path.to_path_buf()))
        }
    }

    pub fn from_pyproject(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let doc: PyProject = toml::from_str(content).map_err(|source| ManifestError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let project = doc.project.ok_or_else(|| ManifestError::MissingProjectTable {
            path: path.to_path_buf(),
        })?;
        let entries = project
            .dependencies
            .ok_or_else(|| ManifestError::MissingDependencies {
                path: path.to_path_buf(),
            })?;

        let dependencies = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                Requirement::parse(entry)
                    .map_err(|e| e.at(format!("{}: [project.dependencies][{}]", path.display(), i)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Manifest {
            kind: ManifestKind::Pyproject,
            path: path.to_path_buf(),
            project_name: project.name,
            requires_python: project.requires_python,
            dependencies,
        })
    }

    pub fn from_requirements(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let dependencies = requirement_lines(path, content)?
            .into_iter()
            .map(|(line, text)| {
                Requirement::parse(&text)
                    .map_err(|e| e.at(format!("{}:{}", path.display(), line)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Manifest {
            kind: ManifestKind::Requirements,
            path: path.to_path_buf(),
            project_name: None,
            requires_python: None,
            dependencies,
        })
    }
}

/// Logical lines of a requirements file, paired with their 1-based start line
///
/// Comments and blank lines are dropped, `\` continuations joined and
/// `--hash` options stripped. Any other option (`-r`, `-e`, `--index-url`,
/// ...) is rejected.
pub(super) fn requirement_lines(
    path: &Path,
    content: &str,
) -> Result<Vec<(usize, String)>, ManifestError> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let without_comment = strip_comment(raw);

        let (text, continues) = match without_comment.trim_end().strip_suffix('\\') {
            Some(stripped) => (stripped, true),
            None => (without_comment, false),
        };

        let (start, mut buffer) = pending.take().unwrap_or((line_no, String::new()));
        buffer.push(' ');
        buffer.push_str(text.trim());

        if continues {
            pending = Some((start, buffer));
            continue;
        }

        let logical = strip_hashes(&buffer);
        if logical.is_empty() {
            continue;
        }
        if logical.starts_with('-') {
            let option = logical.split_whitespace().next().unwrap_or("-").to_string();
            return Err(ManifestError::UnsupportedOption {
                path: path.to_path_buf(),
                line: start,
                option,
            });
        }
        lines.push((start, logical));
    }

    if let Some((start, buffer)) = pending {
        let logical = strip_hashes(&buffer);
        if !logical.is_empty() {
            lines.push((start, logical));
        }
    }

    Ok(lines)
}

/// Drop a `#` comment that starts the line or follows whitespace
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    for (idx, c) in line.char_indices() {
        if c == '#' && prev_is_space {
            return &line[..idx];
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

fn strip_hashes(line: &str) -> String {
    line.split_whitespace()
        .filter(|token| !token.starts_with("--hash"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT: &str = r#"
[project]
name = "repl-nix-workspace"
version = "0.1.0"
requires-python = ">=3.11"
dependencies = [
    "email-validator>=2.2.0",
    "flask>=3.1.1",
    "flask-sqlalchemy>=3.1.1",
    "gunicorn>=23.0.0",
    "openpyxl>=3.1.5",
    "psycopg2-binary>=2.9.10",
]
"#;

    #[test]
    fn test_pyproject_dependencies() {
        let manifest = Manifest::parse(Path::new("pyproject.toml"), PYPROJECT).unwrap();
        assert_eq!(manifest.kind, ManifestKind::Pyproject);
        assert_eq!(manifest.project_name.as_deref(), Some("repl-nix-workspace"));
        assert_eq!(manifest.requires_python.as_deref(), Some(">=3.11"));
        let names: Vec<&str> = manifest
            .dependencies
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "email-validator",
                "flask",
                "flask-sqlalchemy",
                "gunicorn",
                "openpyxl",
                "psycopg2-binary"
            ]
        );
    }

    #[test]
    fn test_pyproject_without_project_table() {
        let err = Manifest::from_pyproject(Path::new("pyproject.toml"), "[tool.black]\n")
            .unwrap_err();
        assert!(matches!(err, ManifestError::MissingProjectTable { .. }));
    }

    #[test]
    fn test_pyproject_with_dynamic_dependencies() {
        let content = "[project]\nname = \"x\"\ndynamic = [\"dependencies\"]\n";
        let err = Manifest::from_pyproject(Path::new("pyproject.toml"), content).unwrap_err();
        assert!(matches!(err, ManifestError::MissingDependencies { .. }));
    }

    #[test]
    fn test_pyproject_bad_entry_reports_index() {
        let content = "[project]\nname = \"x\"\ndependencies = [\"flask\", \"gunicorn=>1\"]\n";
        let err = Manifest::from_pyproject(Path::new("pyproject.toml"), content).unwrap_err();
        assert!(err.to_string().contains("[project.dependencies][1]"));
    }

    #[test]
    fn test_pyproject_invalid_toml() {
        let err = Manifest::from_pyproject(Path::new("pyproject.toml"), "[project\n").unwrap_err();
        assert!(matches!(err, ManifestError::Toml { .. }));
    }

    #[test]
    fn test_requirements_file() {
        let content = "\
# web stack
flask==3.0.0
gunicorn==21.2.0  # server

sqlalchemy>=2.0 \\
    ; python_version >= '3.8'
psycopg2-binary==2.9.9 \\
    --hash=sha256:abcdef
";
        let manifest = Manifest::parse(Path::new("requirements.txt"), content).unwrap();
        assert_eq!(manifest.kind, ManifestKind::Requirements);
        assert_eq!(manifest.dependencies.len(), 4);
        assert!(manifest.dependencies[2].marker.is_some());
        assert_eq!(manifest.dependencies[3].pinned_version(), Some("2.9.9"));
    }

    #[test]
    fn test_requirements_rejects_includes() {
        let err = Manifest::from_requirements(
            Path::new("requirements.txt"),
            "flask==3.0.0\n-r base.txt\n",
        )
        .unwrap_err();
        match err {
            ManifestError::UnsupportedOption { line, option, .. } => {
                assert_eq!(line, 2);
                assert_eq!(option, "-r");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requirements_bad_line_reports_location() {
        let err = Manifest::from_requirements(
            Path::new("requirements.txt"),
            "flask==3.0.0\n\nflask[==1\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("requirements.txt:3"));
    }

    #[test]
    fn test_unknown_manifest_name() {
        assert!(matches!(
            Manifest::parse(Path::new("Pipfile"), ""),
            Err(ManifestError::UnknownManifest(_))
        ));
    }
}

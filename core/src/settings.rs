use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::logger::Logger;

pub const BUILD_FILE_NAME: &str = "anvil.toml";

/// What the caller asked for. Never mutated once a run starts.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub task_names: Vec<String>,
    pub excluded_task_names: Vec<String>,
    pub current_dir: PathBuf,
    pub settings_file: Option<PathBuf>,
    pub merged_build: bool,
}

impl InvocationRequest {
    pub fn new(current_dir: PathBuf) -> Self {
        Self {
            task_names: Vec::new(),
            excluded_task_names: Vec::new(),
            current_dir,
            settings_file: None,
            merged_build: false,
        }
    }

    pub fn with_tasks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_task_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings_file(mut self, path: PathBuf) -> Self {
        self.settings_file = Some(path);
        self
    }

    pub fn merged(mut self, merged: bool) -> Self {
        self.merged_build = merged;
        self
    }

    /// Fallback location for build outputs when settings never resolved.
    pub fn default_build_dir(&self) -> PathBuf {
        self.current_dir.join("build")
    }
}

/// Identity and layout of one project, as declared by the settings walk.
/// Project contents (tasks, defaults, enablement) are read from `build_file`
/// each time the graph is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub name: String,
    pub dir: PathBuf,
    pub build_file: PathBuf,
    pub build_dir: String,
    pub children: Vec<ProjectDescriptor>,
}

impl ProjectDescriptor {
    pub fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            build_file: dir.join(BUILD_FILE_NAME),
            dir,
            build_dir: default_build_dir(),
            children: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(|c| c.count()).sum::<usize>()
    }
}

/// Resolved build-wide settings: where the build lives and its project tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub settings_file: PathBuf,
    pub root: ProjectDescriptor,
}

impl ConfigurationSnapshot {
    pub fn root_dir(&self) -> &Path {
        &self.root.dir
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.dir.join(&self.root.build_dir)
    }
}

pub trait SettingsResolver {
    fn resolve(&self, request: &InvocationRequest) -> Result<ConfigurationSnapshot, BuildError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildFile {
    #[serde(default)]
    pub settings: Option<SettingsSection>,
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub tasks: Vec<TaskSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsSection {
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default_tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub reconfigures: bool,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            build_dir: default_build_dir(),
            enabled: true,
            default_tasks: Vec::new(),
        }
    }
}

fn default_build_dir() -> String {
    "build".to_string()
}

fn default_true() -> bool {
    true
}

impl BuildFile {
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::InvalidSettings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| BuildError::InvalidSettings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Loads `path`, treating a missing file as an empty project.
    pub fn load_optional(path: &Path) -> Result<Self, BuildError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn is_settings(&self) -> bool {
        self.settings.is_some()
    }

    /// Settings file for a fresh single-project build with one `build` task.
    pub fn starter(name: Option<String>) -> Self {
        Self {
            settings: Some(SettingsSection::default()),
            project: ProjectSection {
                name,
                default_tasks: vec!["build".to_string()],
                ..ProjectSection::default()
            },
            tasks: vec![TaskSection {
                name: "build".to_string(),
                description: Some("Builds the project".to_string()),
                depends_on: Vec::new(),
                commands: vec![vec!["echo".to_string(), "Nothing to build yet".to_string()]],
                enabled: true,
                reconfigures: false,
            }],
        }
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let content = toml::to_string_pretty(self).context("Failed to serialize build file to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write build file: {}", path.display()))?;

        Ok(())
    }

    fn descriptor(&self, default_name: &str, dir: PathBuf, build_file: PathBuf) -> ProjectDescriptor {
        ProjectDescriptor {
            name: self
                .project
                .name
                .clone()
                .unwrap_or_else(|| default_name.to_string()),
            dir,
            build_file,
            build_dir: self.project.build_dir.clone(),
            children: Vec::new(),
        }
    }
}

/// Resolves settings from `anvil.toml` files on disk.
pub struct FileSettingsResolver {
    logger: Logger,
}

impl FileSettingsResolver {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Nearest ancestor build file declaring `[settings]`, falling back to a
    /// single-project build in `start` itself.
    pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
        for dir in start.ancestors() {
            let candidate = dir.join(BUILD_FILE_NAME);
            if !candidate.exists() {
                continue;
            }
            if BuildFile::load(&candidate).map(|f| f.is_settings()).unwrap_or(false) {
                return Some(candidate);
            }
        }

        let local = start.join(BUILD_FILE_NAME);
        local.exists().then_some(local)
    }

    fn include(
        &self,
        root: &mut ProjectDescriptor,
        include: &str,
        settings_file: &Path,
    ) -> Result<(), BuildError> {
        let segments: Vec<&str> = include
            .split(['/', ':'])
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(BuildError::InvalidSettings {
                path: settings_file.to_path_buf(),
                reason: format!("empty include entry '{}'", include),
            });
        }

        let mut current = root;
        for segment in segments {
            let dir = current.dir.join(segment);
            let position = current.children.iter().position(|c| c.dir == dir);

            let index = match position {
                Some(index) => index,
                None => {
                    if !dir.is_dir() {
                        return Err(BuildError::InvalidSettings {
                            path: settings_file.to_path_buf(),
                            reason: format!(
                                "included project directory does not exist: {}",
                                dir.display()
                            ),
                        });
                    }
                    let build_file = dir.join(BUILD_FILE_NAME);
                    let file = BuildFile::load_optional(&build_file)?;
                    self.logger
                        .debug(&format!("Including project {} from {}", segment, dir.display()));
                    current
                        .children
                        .push(file.descriptor(segment, dir, build_file));
                    current.children.len() - 1
                }
            };

            current = &mut current.children[index];
        }

        Ok(())
    }
}

impl SettingsResolver for FileSettingsResolver {
    fn resolve(&self, request: &InvocationRequest) -> Result<ConfigurationSnapshot, BuildError> {
        let settings_file = match &request.settings_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => request.current_dir.join(path),
            None => Self::find_settings_file(&request.current_dir)
                .ok_or_else(|| BuildError::SettingsNotFound(request.current_dir.clone()))?,
        };

        if !settings_file.exists() {
            return Err(BuildError::SettingsNotFound(
                settings_file
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| request.current_dir.clone()),
            ));
        }

        let root_dir = settings_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| request.current_dir.clone());

        let file = BuildFile::load(&settings_file)?;
        let includes = file
            .settings
            .as_ref()
            .map(|s| s.include.clone())
            .unwrap_or_default();

        let default_name = root_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());

        let mut root = file.descriptor(&default_name, root_dir, settings_file.clone());
        for include in &includes {
            self.include(&mut root, include, &settings_file)?;
        }

        self.logger.debug(&format!(
            "Resolved settings {} with {} project(s)",
            settings_file.display(),
            root.count()
        ));

        Ok(ConfigurationSnapshot {
            settings_file,
            root,
        })
    }
}

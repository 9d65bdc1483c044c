use crate::error::FilterError;
use anyhow::{anyhow, Context, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the directory created under the output path
pub const OUTPUT_DIR_NAME: &str = "REGEX_FILTER";

/// Disposable working area for one run
///
/// `tree` holds the copy of the inputs that the passes mutate, `work` holds
/// archive extraction and staging directories. Everything is removed when
/// the workspace is dropped, whether the run finished or not.
pub struct Workspace {
    root: TempDir,
    tree: PathBuf,
    work: PathBuf,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("regex-filter-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let tree = root.path().join("tree");
        let work = root.path().join("work");
        fs::create_dir(&tree).context("Failed to create scratch directory")?;
        fs::create_dir(&work).context("Failed to create scratch directory")?;

        log::debug!("Scratch directory: {}", root.path().display());
        Ok(Self { root, tree, work })
    }

    pub fn tree(&self) -> &Path {
        &self.tree
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    /// Copy every input into the tree under its base name
    ///
    /// # Arguments
    /// * `inputs` - Files or directories given on the command line
    ///
    /// # Returns
    /// * `Result<()>` - Ok if all inputs were copied
    pub fn import(&self, inputs: &[PathBuf]) -> Result<()> {
        // Resolve every name first so nothing is copied on a bad input list
        let mut seen = HashSet::new();
        let mut plan = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = input_name(input)?;
            if !seen.insert(name.clone()) {
                return Err(FilterError::DuplicateInput { name }.into());
            }
            plan.push((input, self.tree.join(&name)));
        }

        for (source, target) in plan {
            if source.is_dir() {
                copy_directory(source, &target, true)?;
            } else {
                copy_file(source, &target)?;
            }
            log::debug!("{} -> {}", source.display(), target.display());
        }

        Ok(())
    }

    /// Publish the processed tree as `<output>/REGEX_FILTER`
    ///
    /// Any previous directory at that path is replaced.
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The published directory
    pub fn promote(&self, output: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output)
            .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

        // Copy next to the destination first so a failed copy never replaces it
        let staging = tempfile::Builder::new()
            .prefix(".regex-filter-")
            .tempdir_in(output)
            .with_context(|| format!("Failed to create staging directory in {}", output.display()))?;
        let staged = staging.path().join(OUTPUT_DIR_NAME);
        copy_directory(&self.tree, &staged, false)?;

        let destination = output.join(OUTPUT_DIR_NAME);
        remove_existing(&destination)?;
        fs::rename(&staged, &destination)
            .with_context(|| format!("Failed to move output to {}", destination.display()))?;

        Ok(destination)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace").field("root", &self.root.path()).finish()
    }
}

/// Check that every input exists before anything is copied
pub fn validate_inputs(inputs: &[PathBuf]) -> Result<(), FilterError> {
    for input in inputs {
        if fs::metadata(input).is_err() {
            return Err(FilterError::InputNotFound {
                path: input.clone(),
            });
        }
    }
    Ok(())
}

/// Base name an input gets inside the tree
fn input_name(input: &Path) -> Result<String> {
    // "dir/", "." and ".." have no usable file name until canonicalized
    let name = match input.file_name() {
        Some(name) => name.to_os_string(),
        None => input
            .canonicalize()
            .with_context(|| format!("Failed to resolve input: {}", input.display()))?
            .file_name()
            .ok_or_else(|| anyhow!("Input has no name: {}", input.display()))?
            .to_os_string(),
    };
    Ok(name.to_string_lossy().into_owned())
}

fn remove_existing(path: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove previous output: {}", path.display()))
}

/// Copy a single file
///
/// # Arguments
/// * `source` - Source file path
/// * `target` - Target file path
///
/// # Returns
/// * `Result<()>` - Ok if successful, Error otherwise
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).context("Failed to create target directory")?;
    }

    fs::copy(source, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

/// Copy a directory recursively, hidden files included
///
/// # Arguments
/// * `source_dir` - Source directory path
/// * `target_dir` - Target directory path, created if missing
/// * `follow_links` - Copy what links point at instead of the links
///
/// # Returns
/// * `Result<()>` - Ok if successful, Error otherwise
fn copy_directory(source_dir: &Path, target_dir: &Path, follow_links: bool) -> Result<()> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create directory: {}", target_dir.display()))?;

    // Everything is copied: no ignore files, no hidden-file filtering
    let walker = WalkBuilder::new(source_dir)
        .standard_filters(false)
        .follow_links(follow_links)
        .build();

    for result in walker {
        let entry = result.with_context(|| format!("Failed to walk {}", source_dir.display()))?;
        let source_path = entry.path();

        // Skip the source directory itself
        if entry.depth() == 0 {
            continue;
        }

        let relative_path = source_path
            .strip_prefix(source_dir)
            .with_context(|| format!("Failed to strip prefix from {}", source_path.display()))?;
        let target_path = target_dir.join(relative_path);

        let is_link = entry.path_is_symlink() && !follow_links;
        if is_link {
            copy_link(source_path, &target_path)?;
        } else if source_path.is_dir() {
            fs::create_dir_all(&target_path)
                .with_context(|| format!("Failed to create directory: {}", target_path.display()))?;
        } else {
            copy_file(source_path, &target_path)?;
        }
    }

    Ok(())
}

/// Recreate a symbolic link as a link
#[cfg(unix)]
fn copy_link(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)
        .with_context(|| format!("Failed to read link {}", source.display()))?;
    std::os::unix::fs::symlink(&link, target)
        .with_context(|| format!("Failed to create link {}", target.display()))
}

#[cfg(not(unix))]
fn copy_link(source: &Path, _target: &Path) -> Result<()> {
    log::warn!("Skipping symbolic link {}", source.display());
    Ok(())
}

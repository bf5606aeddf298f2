//! Per-session copies of template directories.
//!
//! Running two sessions in the same directory would share `.terraform/`
//! and the local state file. An [`IsolatedWorkspace`] copies the template
//! into a private temporary directory that is removed on drop, unless it
//! is [kept](IsolatedWorkspace::keep) because it holds state for resources
//! that could not be destroyed.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{IacError, IacResult};
use crate::template::TemplateHandle;

/// Private copy of a template directory.
#[derive(Debug)]
pub struct IsolatedWorkspace {
    // Removed on drop unless kept.
    dir: TempDir,
    root: PathBuf,
}

impl IsolatedWorkspace {
    /// Copy `handle`'s template into a fresh directory under `parent`
    /// (the system temp dir when `None`) and return the workspace plus a
    /// handle pointing at the copy.
    pub fn create(
        handle: &TemplateHandle,
        parent: Option<&Path>,
    ) -> IacResult<(Self, TemplateHandle)> {
        handle.validate()?;

        let dir = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("infratest-");
            match parent {
                Some(parent) => {
                    fs::create_dir_all(parent)?;
                    builder.tempdir_in(parent)?
                }
                None => builder.tempdir()?,
            }
        };

        let root = dir.path().join(handle.name());
        copy_template(handle.root(), &root)?;
        debug!("Isolated {:?} into {:?}", handle.root(), root);

        let isolated = handle.with_root(&root);
        Ok((
            Self { dir, root },
            isolated,
        ))
    }

    /// Root of the copied template.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Leave the copy, and any state file in it, on disk. Returns its root.
    pub fn keep(self) -> PathBuf {
        let _parent = self.dir.keep();
        self.root
    }
}

/// Local engine state that must not leak between workspaces.
fn is_local_state(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return name == ".terraform" || name == ".git";
    }
    name.ends_with(".tfstate") || name.ends_with(".tfstate.backup")
}

fn copy_template(source: &Path, dest: &Path) -> IacResult<()> {
    for entry in WalkDir::new(source)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_local_state(e))
    {
        let entry = entry.map_err(|e| IacError::Workspace(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| IacError::Workspace(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

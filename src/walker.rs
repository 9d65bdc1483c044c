use crate::archive::ArchiveKind;
use crate::args::Pass;
use crate::context::RunContext;
use crate::modifier;
use crate::renamer;
use crate::report::Status;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Run one pass over every entry under `root`
///
/// Paths in status lines are shown relative to `root`.
///
/// # Arguments
/// * `ctx` - Run context with rules and archive handlers
/// * `root` - Directory to process
/// * `pass` - Which pass to run
///
/// # Returns
/// * `Result<()>` - Err only for fatal problems, including interruption
pub fn run_pass(ctx: &RunContext, root: &Path, pass: Pass) -> Result<()> {
    walk_dir(ctx, root, Path::new(""), pass)
}

/// Process the contents of `dir`, depth first
///
/// `shown` is the path of `dir` as the user sees it. For a directory
/// extracted from an archive it is the archive's own path.
fn walk_dir(ctx: &RunContext, dir: &Path, shown: &Path, pass: Pass) -> Result<()> {
    for child in list_children(dir)? {
        ctx.check_cancelled()?;

        let Some(name) = child.file_name() else {
            continue;
        };
        let shown_child = shown.join(name);

        let file_type = fs::symlink_metadata(&child)
            .with_context(|| format!("Failed to stat {}", child.display()))?
            .file_type();

        if file_type.is_symlink() {
            // Links are never followed, only renamed
            if pass == Pass::Rename {
                rename_entry(ctx, &child, &shown_child);
            } else {
                ctx.report(Status::NotModified { path: &shown_child });
            }
            continue;
        }

        if file_type.is_dir() {
            // Post-order: children first, then the directory's own name
            walk_dir(ctx, &child, &shown_child, pass)?;
            if pass == Pass::Rename {
                rename_entry(ctx, &child, &shown_child);
            }
            continue;
        }

        match ctx.archives().probe(&child) {
            Ok(Some(kind)) => process_archive(ctx, &child, kind, &shown_child, pass)?,
            Ok(None) => process_file(ctx, &child, &shown_child, pass),
            Err(err) => {
                ctx.check_cancelled()?;
                ctx.report(Status::Failed {
                    action: "extract",
                    path: &shown_child,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Extract, recurse, repack, then (rename pass) rename the archive itself
fn process_archive(
    ctx: &RunContext,
    archive: &Path,
    kind: ArchiveKind,
    shown: &Path,
    pass: Pass,
) -> Result<()> {
    let extraction = match ctx.archives().extract(archive, kind) {
        Ok(extraction) => extraction,
        Err(err) => {
            ctx.check_cancelled()?;
            // The archive stays in the tree exactly as it was
            ctx.report(Status::Failed {
                action: "extract",
                path: shown,
                reason: err.to_string(),
            });
            return Ok(());
        }
    };

    // An interruption here drops `extraction`, which removes its directory
    walk_dir(ctx, extraction.path(), shown, pass)?;

    if let Err(err) = ctx.archives().repack(extraction, archive) {
        ctx.check_cancelled()?;
        ctx.report(Status::Failed {
            action: "repack",
            path: shown,
            reason: err.to_string(),
        });
        return Ok(());
    }

    if pass == Pass::Rename {
        rename_entry(ctx, archive, shown);
    }
    Ok(())
}

/// Handle an ordinary file
fn process_file(ctx: &RunContext, path: &Path, shown: &Path, pass: Pass) {
    match pass {
        Pass::Content => match modifier::modify_file(ctx.rules(), path) {
            Ok(result) if result.changed => {
                log::debug!("Rewrote {}", result.path.display());
                ctx.report(Status::Modified {
                    path: shown,
                    count: result.substitutions,
                });
            }
            Ok(_) => ctx.report(Status::NotModified { path: shown }),
            Err(err) => ctx.report(Status::Failed {
                action: "read",
                path: shown,
                reason: err.to_string(),
            }),
        },
        Pass::Rename => rename_entry(ctx, path, shown),
    }
}

/// Rename a file, directory or archive and report it
fn rename_entry(ctx: &RunContext, path: &Path, shown: &Path) {
    match renamer::rename_path(ctx.rules(), path) {
        Ok(result) if result.renamed => {
            log::debug!(
                "{} -> {}",
                result.old_path.display(),
                result.new_path.display()
            );
            let new_shown = match result.new_path.file_name() {
                Some(new_name) => shown.with_file_name(new_name),
                None => result.new_path.clone(),
            };
            ctx.report(Status::Renamed {
                path: shown,
                new_path: &new_shown,
            });
        }
        Ok(_) => ctx.report(Status::NotRenamed { path: shown }),
        Err(err) => ctx.report(Status::Failed {
            action: "rename",
            path: shown,
            reason: err.to_string(),
        }),
    }
}

/// Immediate children of `dir`, hidden files included, in name order
fn list_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(Some(1))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut children = Vec::new();
    for result in walker {
        let entry = result.with_context(|| format!("Failed to list {}", dir.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        children.push(entry.into_path());
    }

    Ok(children)
}

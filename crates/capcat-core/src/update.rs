use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{CapcatError, Result};

/// The state of a prior run's output for one command's expected set of
/// targets, per §4.9. Computed by comparing `OutputLayout`-derived
/// expected paths against the filesystem; never by re-running
/// discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// None of the expected target directories exist yet.
    NoPriorWork,
    /// Every expected target directory already exists.
    AllPresent,
    /// Some, but not all, expected target directories exist.
    Partial,
    /// Existing directories exist, but discovery targets are not known
    /// in advance (e.g. bundle/fetch commands, whose article set isn't
    /// fixed until discovery runs) — always re-run and reconcile.
    Mixed,
}

/// The choice offered to an interactive user when prior work exists.
/// Delegated entirely to an external UI collaborator for single-article
/// and interactive modes; fetch/bundle modes never ask (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateChoice {
    DownloadMissing,
    UpdateExisting,
    Cancel,
}

/// The external collaborator that turns an `ArchiveState` into a user
/// decision. The core never prints prompts or reads stdin itself.
pub trait UiCollaborator: Send + Sync {
    fn choose(&self, state: ArchiveState) -> UpdateChoice;
}

/// Always proceeds without asking — the batch/bundle-mode behavior
/// §4.9 specifies ("auto-updates without prompting").
pub struct AutoUpdate;

impl UiCollaborator for AutoUpdate {
    fn choose(&self, _state: ArchiveState) -> UpdateChoice {
        UpdateChoice::UpdateExisting
    }
}

/// Decides whether a command's work is a fresh run or an update of
/// today's archive, and carries out the narrow "update an existing
/// specialized article" behavior §4.9 defines precisely (liveness
/// check + footer/warning). Everything else about "update" (re-run
/// discovery and fetch, overwrite via the fetcher's atomic write) needs
/// no special handling here — it falls out of the batch processor's
/// normal path.
pub struct UpdateController {
    client: reqwest::Client,
}

impl UpdateController {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Classify prior work for a known, fixed set of expected paths
    /// (e.g. a single-article command, where the target path is
    /// computable before any network call).
    pub fn classify(expected_paths: &[PathBuf]) -> ArchiveState {
        if expected_paths.is_empty() {
            return ArchiveState::NoPriorWork;
        }
        let present = expected_paths.iter().filter(|p| p.exists()).count();
        if present == 0 {
            ArchiveState::NoPriorWork
        } else if present == expected_paths.len() {
            ArchiveState::AllPresent
        } else {
            ArchiveState::Partial
        }
    }

    /// Ask the UI collaborator what to do given the classified state.
    /// Fetch/bundle callers pass `&AutoUpdate` to get the non-prompting
    /// behavior unconditionally.
    pub fn decide(ui: &dyn UiCollaborator, state: ArchiveState) -> UpdateChoice {
        match state {
            ArchiveState::NoPriorWork => UpdateChoice::DownloadMissing,
            other => ui.choose(other),
        }
    }

    /// HEAD-check a URL with a short timeout. Used only for specialized
    /// article directories that already exist under update mode — never
    /// for ordinary articles, which are simply re-fetched.
    pub async fn check_liveness(&self, url: &str, timeout: Duration) -> bool {
        match self.client.head(url).timeout(timeout).send().await {
            Ok(response) => response.status().is_success() || response.status().is_redirection(),
            Err(e) => {
                debug!(url, error = %e, "liveness check failed, treating as dead");
                false
            }
        }
    }

    /// Append a `Last Updated` footer (alive) or a warning block (dead)
    /// to an existing specialized article's markdown file. Original
    /// content is never deleted or rewritten, only appended to.
    pub async fn annotate_existing_article(article_md: &Path, alive: bool) -> Result<()> {
        let note = if alive {
            format!("\n\n---\n*Last Updated: {}*\n", Utc::now().to_rfc3339())
        } else {
            format!(
                "\n\n---\n**Warning:** this link no longer responds as of {}.\n",
                Utc::now().to_rfc3339()
            )
        };

        let mut existing = match tokio::fs::read_to_string(article_md).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %article_md.display(), error = %e, "could not read existing article for update annotation");
                return Err(CapcatError::FileSystem {
                    operation: "read article for update".to_string(),
                    path: article_md.to_path_buf(),
                    source: e,
                });
            }
        };
        existing.push_str(&note);

        let tmp_path = article_md.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, existing.as_bytes())
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "write update annotation".to_string(),
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, article_md)
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "rename update annotation".to_string(),
                path: article_md.to_path_buf(),
                source: e,
            })
    }
}

//! `src/sched/fetchers/link_info.rs`
//! ============================================================================
//! # Link-Info Fetcher
//!
//! Applies to desktop-link-style files only. Reads and parses the link's
//! contents to resolve target URI, display name, icon and launcher flag.
//!
//! A link's icon and display-name override are only honored when the link
//! is trusted: the file is executable, or it is a regular file under a
//! system data directory, or it is a symlink whose target resolves into
//! one. Untrusted links surface neither override.
//!
//! Contents are read asynchronously; the synchronous same-thread read is an
//! explicit opt-in (`Settings::sync_link_reads`) for local non-directory
//! files and stays off by default.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::fs::provider::FileKind;
use crate::model::file_entry::{FileEntry, FileSeed, LinkState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct LinkInfoFetch;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedLink {
    pub display_name: Option<CompactString>,
    pub icon_name: Option<CompactString>,
    pub activation_uri: Option<CompactString>,
    pub is_launcher: bool,
}

#[derive(Debug)]
pub(crate) struct LinkResult {
    pub parsed: ParsedLink,
    pub trusted: bool,
}

/// Desktop-link classification: content type when known, name suffix as the
/// fallback before stat info has been parsed into a type.
fn entry_is_link(file: &FileEntry) -> bool {
    if let Some(info) = &file.info {
        if let Some(mime) = &info.mime_type {
            return mime == "application/x-desktop";
        }
    }
    file.name.ends_with(".desktop")
}

/// Parse key-file style link contents. Only the `[Desktop Entry]` group is
/// honored.
pub(crate) fn parse_link_contents(raw: &[u8]) -> ParsedLink {
    let text = String::from_utf8_lossy(raw);
    let mut parsed = ParsedLink::default();
    let mut in_entry = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => parsed.display_name = Some(CompactString::new(value)),
            "Icon" => parsed.icon_name = Some(CompactString::new(value)),
            "URL" => parsed.activation_uri = Some(CompactString::new(value)),
            "Type" => parsed.is_launcher = value == "Application",
            _ => {}
        }
    }

    parsed
}

/// Trust rule: executable, or located under a system data directory, or a
/// symlink whose target resolves into one.
pub(crate) fn link_is_trusted(seed: &FileSeed, system_data_dirs: &[PathBuf]) -> bool {
    if seed.is_executable {
        return true;
    }

    let under_system = |path: &Path| system_data_dirs.iter().any(|dir| path.starts_with(dir));

    if under_system(&seed.path) {
        return true;
    }

    seed.symlink_target.as_deref().is_some_and(under_system)
}

impl FetchClass for LinkInfoFetch {
    const KIND: FetchKind = FetchKind::LinkInfo;
    type Output = LinkResult;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.link.up_to_date
    }

    fn ready(file: &FileEntry) -> bool {
        file.info_up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        if entry_is_link(file) {
            return false;
        }
        file.link = LinkState {
            up_to_date: true,
            ..LinkState::default()
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<LinkResult>> {
        Box::pin(async move {
            let sync_read =
                ctx.settings.sync_link_reads && ctx.seed.kind != Some(FileKind::Directory);

            let raw = if sync_read {
                ctx.provider.load_contents_sync(&ctx.seed.path)
            } else {
                ctx.provider
                    .load_contents(&ctx.seed.path, ctx.token.clone())
                    .await
            }
            .map_err(FetchError::from)?;

            Ok(LinkResult {
                parsed: parse_link_contents(&raw),
                trusted: link_is_trusted(&ctx.seed, &ctx.settings.system_data_dirs),
            })
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<LinkResult>) {
        match out {
            Ok(result) => {
                let trusted = result.trusted;
                file.link = LinkState {
                    up_to_date: true,
                    failed: None,
                    display_name: trusted
                        .then_some(result.parsed.display_name)
                        .flatten(),
                    icon_name: trusted.then_some(result.parsed.icon_name).flatten(),
                    activation_uri: result.parsed.activation_uri,
                    is_launcher: result.parsed.is_launcher,
                    is_trusted: trusted,
                };
            }
            Err(FetchError::NotFound) => {
                file.link = LinkState {
                    up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    ..LinkState::default()
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.link = LinkState {
                    up_to_date: true,
                    failed: Some(kind),
                    ..LinkState::default()
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const LINK: &str = "[Desktop Entry]\nType=Link\nName=My App\nIcon=fancy\nURL=file:///opt/app\n";

    fn seed_for(path: &str) -> FileSeed {
        FileSeed {
            name: CompactString::new("app.desktop"),
            path: Arc::new(PathBuf::from(path)),
            kind: Some(FileKind::File),
            size: 0,
            modified: None,
            mime_type: Some(CompactString::new("application/x-desktop")),
            is_executable: false,
            symlink_target: None,
            thumbnail_path: None,
            is_mountpoint: false,
            filesystem_id: None,
        }
    }

    fn system_dirs() -> Vec<PathBuf> {
        vec![PathBuf::from("/usr/share")]
    }

    #[test]
    fn test_parse_desktop_entry_group_only() {
        let parsed = parse_link_contents(LINK.as_bytes());
        assert_eq!(parsed.display_name.as_deref(), Some("My App"));
        assert_eq!(parsed.icon_name.as_deref(), Some("fancy"));
        assert_eq!(parsed.activation_uri.as_deref(), Some("file:///opt/app"));
        assert!(!parsed.is_launcher);

        let other = parse_link_contents(b"[Other]\nName=Nope\n");
        assert_eq!(other.display_name, None);
    }

    #[test]
    fn test_untrusted_link_outside_system_dirs() {
        // Non-executable link in a home directory: untrusted.
        let seed = seed_for("/home/user/app.desktop");
        assert!(!link_is_trusted(&seed, &system_dirs()));

        // The same link made executable: trusted.
        let mut exec = seed_for("/home/user/app.desktop");
        exec.is_executable = true;
        assert!(link_is_trusted(&exec, &system_dirs()));
    }

    #[test]
    fn test_trust_via_system_dir_and_symlink_target() {
        let seed = seed_for("/usr/share/applications/app.desktop");
        assert!(link_is_trusted(&seed, &system_dirs()));

        let mut via_link = seed_for("/home/user/app.desktop");
        via_link.symlink_target = Some(PathBuf::from("/usr/share/applications/app.desktop"));
        assert!(link_is_trusted(&via_link, &system_dirs()));
    }

    #[test]
    fn test_untrusted_apply_strips_overrides() {
        let location = Arc::new(PathBuf::from("/home/user"));
        let mut file = FileEntry::new("app.desktop", &location);

        LinkInfoFetch::apply(
            &mut file,
            Ok(LinkResult {
                parsed: parse_link_contents(LINK.as_bytes()),
                trusted: false,
            }),
        );

        assert!(file.link.up_to_date);
        assert!(!file.link.is_trusted);
        assert_eq!(file.link.display_name, None);
        assert_eq!(file.link.icon_name, None);
        // The activation target itself is not an override.
        assert_eq!(file.link.activation_uri.as_deref(), Some("file:///opt/app"));
    }

    #[test]
    fn test_trusted_apply_keeps_overrides() {
        let location = Arc::new(PathBuf::from("/usr/share/applications"));
        let mut file = FileEntry::new("app.desktop", &location);

        LinkInfoFetch::apply(
            &mut file,
            Ok(LinkResult {
                parsed: parse_link_contents(LINK.as_bytes()),
                trusted: true,
            }),
        );

        assert!(file.link.is_trusted);
        assert_eq!(file.link.display_name.as_deref(), Some("My App"));
        assert_eq!(file.link.icon_name.as_deref(), Some("fancy"));
    }
}

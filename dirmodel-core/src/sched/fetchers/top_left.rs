//! `src/sched/fetchers/top_left.rs`
//! ============================================================================
//! # Leading-Text Fetcher
//!
//! Reads a bounded prefix of a text-bearing file, stopping at a byte cap or
//! a line-count cap, whichever comes first. Two cap profiles exist (normal
//! and large); a large read satisfies the normal request as well, a normal
//! read does not satisfy the large one.

use futures::future::BoxFuture;

use crate::config::TextCaps;
use crate::fs::attributes::Request;
use crate::model::file_entry::{FileEntry, TopLeftState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct TopLeftFetch;

pub(crate) struct TopLeftResult {
    pub text: String,
    pub large: bool,
}

fn is_text_bearing(file: &FileEntry) -> bool {
    file.info
        .as_ref()
        .and_then(|info| info.mime_type.as_deref())
        .is_some_and(|mime| mime.starts_with("text/"))
}

/// Trim raw bytes to the cap profile: lossy UTF-8, at most `max_lines`
/// lines (bytes were already capped at read time).
pub(crate) fn clip_leading_text(raw: &[u8], caps: TextCaps) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut lines: Vec<&str> = Vec::with_capacity(caps.max_lines);
    for line in text.lines().take(caps.max_lines) {
        lines.push(line);
    }
    lines.join("\n")
}

impl FetchClass for TopLeftFetch {
    const KIND: FetchKind = FetchKind::TopLeftText;
    type Output = TopLeftResult;

    fn is_missing(file: &FileEntry, wants: Request) -> bool {
        (wants.intersects(Request::TOP_LEFT_TEXT) && !file.top_left.up_to_date)
            || (wants.intersects(Request::LARGE_TOP_LEFT_TEXT) && !file.top_left.large_up_to_date)
    }

    fn ready(file: &FileEntry) -> bool {
        file.info_up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        if is_text_bearing(file) {
            return false;
        }
        file.top_left = TopLeftState {
            up_to_date: true,
            large_up_to_date: true,
            failed: None,
            text: None,
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<TopLeftResult>> {
        Box::pin(async move {
            let large = ctx.wants.intersects(Request::LARGE_TOP_LEFT_TEXT);
            let caps = if large {
                ctx.settings.large_text_caps
            } else {
                ctx.settings.text_caps
            };

            let raw = ctx
                .provider
                .load_partial_contents(&ctx.seed.path, caps.max_bytes, ctx.token.clone())
                .await
                .map_err(FetchError::from)?;

            Ok(TopLeftResult {
                text: clip_leading_text(&raw, caps),
                large,
            })
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<TopLeftResult>) {
        match out {
            Ok(result) => {
                file.top_left.text = Some(result.text);
                file.top_left.failed = None;
                file.top_left.up_to_date = true;
                if result.large {
                    file.top_left.large_up_to_date = true;
                }
            }
            Err(FetchError::NotFound) => {
                file.top_left = TopLeftState {
                    up_to_date: true,
                    large_up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    text: None,
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.top_left = TopLeftState {
                    up_to_date: true,
                    large_up_to_date: true,
                    failed: Some(kind),
                    text: None,
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}

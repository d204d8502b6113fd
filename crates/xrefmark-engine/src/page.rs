//! Decide what, if anything, the current page asks to resolve.

use regex::Regex;
use std::sync::OnceLock;

use crate::dom::Document;
use crate::request::ResolveRequest;

fn blob_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/]+/[^/]+)/blob/([^/]+)/(.+)$")
            .expect("Invalid blob regex")
    })
}

fn commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/]+/[^/]+)/commit/([^/]+)$")
            .expect("Invalid commit regex")
    })
}

fn pull_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^/([^/]+/[^/]+)/pull/([0-9]+)/show_toc\?base_sha=([0-9a-fA-F]+)&sha1=([0-9a-fA-F]+)&sha2=([0-9a-fA-F]+)$",
        )
        .expect("Invalid pull request regex")
    })
}

/// Map a page link to the request it implies, if any
pub fn classify_link(link: &str) -> Option<ResolveRequest> {
    if let Some(caps) = blob_pattern().captures(link) {
        return Some(ResolveRequest::Blob {
            slug: caps[1].to_string(),
            commit: caps[2].to_string(),
            path: caps[3].to_string(),
        });
    }
    if let Some(caps) = commit_pattern().captures(link) {
        return Some(ResolveRequest::Commit {
            slug: caps[1].to_string(),
            commit: caps[2].to_string(),
        });
    }
    let caps = pull_pattern().captures(link)?;
    Some(ResolveRequest::Pr {
        slug: caps[1].to_string(),
        id: caps[2].to_string(),
        base: caps[3].to_string(),
        old: caps[4].to_string(),
        new: caps[5].to_string(),
    })
}

/// The page's identifying link: the permalink shortcut's `href`, or failing
/// that the `src` of the pull request table of contents menu.
pub fn page_link(doc: &Document) -> Option<String> {
    let root = doc.root();
    let permalink = doc
        .descendants(root)
        .find(|&node| doc.has_class(node, "js-permalink-shortcut"))
        .and_then(|node| doc.attr(node, "href"))
        .filter(|href| !href.is_empty());
    if let Some(href) = permalink {
        return Some(href.to_string());
    }

    doc.descendants(root)
        .find(|&node| {
            doc.tag(node) == Some("details-menu")
                && doc
                    .parent(node)
                    .is_some_and(|parent| doc.has_class(parent, "toc-select"))
        })
        .and_then(|node| doc.attr(node, "src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

pub fn classify_page(doc: &Document) -> Option<ResolveRequest> {
    classify_link(&page_link(doc)?)
}

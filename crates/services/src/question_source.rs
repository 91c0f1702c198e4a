//! Loads STACK question definitions from Moodle XML export files.

use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;

use crate::error::QuestionSourceError;

/// A single STACK question ready to send to the rendering API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedQuestion {
    /// The question element wrapped in a `<quiz>` document.
    pub question_xml: String,
    pub deployed_seeds: Vec<i64>,
}

impl LoadedQuestion {
    /// A random deployed seed, or `None` when the question declares none.
    #[must_use]
    pub fn pick_seed(&self) -> Option<i64> {
        self.deployed_seeds.choose(&mut rand::rng()).copied()
    }
}

/// Reads question files relative to a root directory.
#[derive(Debug, Clone)]
pub struct QuestionSource {
    root: PathBuf,
}

impl QuestionSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `file_reference` and extract the named STACK question, or the first one.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSourceError::Io` if the file cannot be read and
    /// `QuestionSourceError::NotFound` if no matching STACK question exists.
    pub async fn load(
        &self,
        file_reference: &str,
        question_name: Option<&str>,
    ) -> Result<LoadedQuestion, QuestionSourceError> {
        let path = self.root.join(file_reference);
        let xml = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| QuestionSourceError::Io {
                path: path.clone(),
                source,
            })?;

        let loaded = extract_question(&xml, question_name).ok_or_else(|| {
            QuestionSourceError::NotFound {
                file: file_reference.to_string(),
                name: question_name.map(str::to_string),
            }
        })?;
        tracing::debug!(
            file = file_reference,
            seeds = loaded.deployed_seeds.len(),
            "loaded STACK question"
        );
        Ok(loaded)
    }
}

/// Find the first `<question type="stack">` whose `<name><text>` equals `question_name`.
/// With no name, the first STACK question matches.
#[must_use]
pub fn extract_question(xml: &str, question_name: Option<&str>) -> Option<LoadedQuestion> {
    let wanted = question_name.map(str::trim).filter(|name| !name.is_empty());
    let mut rest = xml;

    while let Some(start) = rest.find("<question") {
        let from_start = &rest[start..];
        let end = from_start.find("</question>")? + "</question>".len();
        let element = &from_start[..end];
        rest = &from_start[end..];

        let Some(open_end) = element.find('>') else {
            continue;
        };
        if !attribute(&element[..open_end], "type").is_some_and(|t| t.eq_ignore_ascii_case("stack"))
        {
            continue;
        }
        if let Some(wanted) = wanted {
            if question_title(element).as_deref() != Some(wanted) {
                continue;
            }
        }

        return Some(LoadedQuestion {
            question_xml: format!("<quiz>\n{element}\n</quiz>"),
            deployed_seeds: deployed_seeds(element),
        });
    }
    None
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    for quote in ['"', '\''] {
        let needle = format!("{name}={quote}");
        if let Some(pos) = tag.find(&needle) {
            let value = &tag[pos + needle.len()..];
            return value.find(quote).map(|end| &value[..end]);
        }
    }
    None
}

fn inner_text<'a>(element: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = element.find(&open)? + open.len();
    let len = element[start..].find(&close)?;
    Some(&element[start..start + len])
}

fn question_title(element: &str) -> Option<String> {
    let name = inner_text(element, "name")?;
    let text = inner_text(name, "text")?;
    Some(unescape(text.trim()))
}

fn deployed_seeds(element: &str) -> Vec<i64> {
    let mut seeds = Vec::new();
    let mut rest = element;
    while let Some(seed) = inner_text(rest, "deployedseed") {
        if let Ok(value) = seed.trim().parse() {
            seeds.push(value);
        }
        let Some(close) = rest.find("</deployedseed>") else {
            break;
        };
        rest = &rest[close + "</deployedseed>".len()..];
    }
    seeds
}

fn unescape(text: &str) -> String {
    let text = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text);
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

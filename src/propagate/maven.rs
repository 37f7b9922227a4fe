use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::{
    Reader, Writer,
    events::{BytesText, Event},
};
use tokio::fs;
use tracing::info;

use super::TokenPropagator;
use crate::error::EngineError;

/// Server ids in settings.xml that carry the CodeArtifact token by default
pub const DEFAULT_SERVER_IDS: [&str; 3] = [
    "cxone-codeartifact",
    "platform-utils",
    "plugins-codeartifact",
];

/// Writes the token into the `<password>` of matching `<server>` entries of
/// a Maven settings.xml, leaving the rest of the document untouched
#[derive(Debug, Clone)]
pub struct MavenSettingsPropagator {
    path: PathBuf,
    server_ids: Vec<String>,
}

impl MavenSettingsPropagator {
    pub fn new(path: PathBuf, server_ids: Vec<String>) -> Self {
        Self { path, server_ids }
    }

    async fn update(&self, token: &str) -> Result<usize> {
        let xml = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("No settings.xml at {}", self.path.display()))?;

        let (rewritten, updated) = rewrite_server_passwords(&xml, &self.server_ids, token)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        if updated > 0 {
            fs::write(&self.path, rewritten)
                .await
                .with_context(|| format!("Failed to write {}", self.path.display()))?;
        }
        Ok(updated)
    }
}

#[async_trait]
impl TokenPropagator for MavenSettingsPropagator {
    fn name(&self) -> &str {
        "maven settings.xml"
    }

    async fn write(&self, token: &str) -> Result<(), EngineError> {
        let updated = self
            .update(token)
            .await
            .map_err(|e| EngineError::Propagation {
                target: self.name().to_string(),
                message: format!("{e:#}"),
            })?;

        info!(
            "Updated {} server entries in {} with CodeArtifact token",
            updated,
            self.path.display()
        );
        Ok(())
    }
}

/// Replace the password of every `<server>` whose `<id>` is in `server_ids`.
/// Returns the new document and the number of servers changed.
pub fn rewrite_server_passwords(
    xml: &str,
    server_ids: &[String],
    token: &str,
) -> Result<(String, usize)> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    // Events of the <server> element currently being read
    let mut server: Option<Vec<Event<'static>>> = None;
    let mut depth = 0usize;
    let mut updated = 0;

    loop {
        let event = reader.read_event()?;
        if matches!(event, Event::Eof) {
            break;
        }

        if server.is_none() {
            let opens_server =
                matches!(&event, Event::Start(e) if e.local_name().as_ref() == b"server");
            if opens_server {
                server = Some(vec![event.into_owned()]);
                depth = 1;
            } else {
                writer.write_event(event)?;
            }
            continue;
        }

        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        if let Some(buffer) = server.as_mut() {
            buffer.push(event.into_owned());
        }

        if depth == 0 {
            let events = server.take().unwrap_or_default();
            if server_id(&events).is_some_and(|id| server_ids.contains(&id)) {
                if replace_password(events, token, &mut writer)? {
                    updated += 1;
                }
            } else {
                for event in events {
                    writer.write_event(event)?;
                }
            }
        }
    }

    let output = String::from_utf8(writer.into_inner()).context("settings.xml is not UTF-8")?;
    Ok((output, updated))
}

/// Text of the `<id>` child of a buffered `<server>` element
fn server_id(events: &[Event<'static>]) -> Option<String> {
    let mut depth = 0usize;
    let mut in_id = false;

    for event in events {
        match event {
            Event::Start(e) => {
                depth += 1;
                in_id = depth == 2 && e.local_name().as_ref() == b"id";
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                in_id = false;
            }
            Event::Text(text) if in_id => {
                return text.unescape().ok().map(|id| id.trim().to_string());
            }
            _ => {}
        }
    }
    None
}

/// Write the server with its `<password>` content swapped for `token`.
/// Returns false when the server has no password element.
fn replace_password(
    events: Vec<Event<'static>>,
    token: &str,
    writer: &mut Writer<Vec<u8>>,
) -> Result<bool> {
    let mut depth = 0usize;
    let mut replaced = false;
    let mut skipping = false;

    for event in events {
        match event {
            Event::Start(ref e) if depth == 1 && e.local_name().as_ref() == b"password" => {
                depth += 1;
                writer.write_event(event.clone())?;
                writer.write_event(Event::Text(BytesText::new(token)))?;
                skipping = true;
                replaced = true;
            }
            Event::Empty(ref e) if depth == 1 && e.local_name().as_ref() == b"password" => {
                writer.write_event(Event::Start(e.clone()))?;
                writer.write_event(Event::Text(BytesText::new(token)))?;
                writer.write_event(Event::End(e.to_end().into_owned()))?;
                replaced = true;
            }
            Event::Start(_) => {
                depth += 1;
                if !skipping {
                    writer.write_event(event)?;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if skipping && depth == 1 {
                    skipping = false;
                }
                if !skipping {
                    writer.write_event(event)?;
                }
            }
            _ if skipping => {}
            _ => writer.write_event(event)?,
        }
    }

    Ok(replaced)
}

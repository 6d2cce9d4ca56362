// Template and snippet sub-protocol
//
// The backend renders installer configuration from two kinds of text
// file: kickstart/preseed templates and the snippets they include. Both
// are addressed by filesystem path and carry no typed attributes.

use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::session::{Arg, Session};

/// Which family of text file an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TemplateKind {
    Template,
    Snippet,
}

impl TemplateKind {
    fn access_method(self) -> &'static str {
        match self {
            Self::Template => "read_or_write_kickstart_template",
            Self::Snippet => "read_or_write_snippet",
        }
    }

    fn list_method(self) -> &'static str {
        match self {
            Self::Template => "get_kickstart_templates",
            Self::Snippet => "get_snippets",
        }
    }
}

/// Read, write and list templates and snippets on one session.
#[derive(Debug, Clone)]
pub struct Templates {
    session: Session,
}

impl Templates {
    pub fn new(session: &Session) -> Self {
        Self {
            session: session.clone(),
        }
    }

    /// Read one file's contents.
    pub async fn read(&self, kind: TemplateKind, path: &str) -> Result<String, Error> {
        debug!(%kind, path, "reading");
        let result = self
            .session
            .call(
                kind.access_method(),
                vec![Arg::value(path), Arg::value(true), Arg::value(""), Arg::Token],
            )
            .await?;
        into_text(kind.access_method(), result)
    }

    /// Overwrite one file. The backend only accepts paths under its own
    /// template and snippet directories.
    pub async fn write(&self, kind: TemplateKind, path: &str, contents: &str) -> Result<(), Error> {
        debug!(%kind, path, bytes = contents.len(), "writing");
        self.session
            .call(
                kind.access_method(),
                vec![Arg::value(path), Arg::value(false), Arg::value(contents), Arg::Token],
            )
            .await?;
        Ok(())
    }

    /// Paths of every registered file of `kind`.
    pub async fn list(&self, kind: TemplateKind) -> Result<Vec<String>, Error> {
        let method = kind.list_method();
        match self.session.call(method, vec![Arg::Token]).await? {
            Value::Null => Ok(Vec::new()),
            Value::Array(paths) => paths
                .into_iter()
                .map(|path| into_text(method, path))
                .collect(),
            other => Err(Error::Decoding {
                message: format!("{method} returned {other} instead of a list"),
            }),
        }
    }

    pub async fn read_template(&self, path: &str) -> Result<String, Error> {
        self.read(TemplateKind::Template, path).await
    }

    pub async fn write_template(&self, path: &str, contents: &str) -> Result<(), Error> {
        self.write(TemplateKind::Template, path, contents).await
    }

    pub async fn list_templates(&self) -> Result<Vec<String>, Error> {
        self.list(TemplateKind::Template).await
    }

    pub async fn read_snippet(&self, path: &str) -> Result<String, Error> {
        self.read(TemplateKind::Snippet, path).await
    }

    pub async fn write_snippet(&self, path: &str, contents: &str) -> Result<(), Error> {
        self.write(TemplateKind::Snippet, path, contents).await
    }

    pub async fn list_snippets(&self) -> Result<Vec<String>, Error> {
        self.list(TemplateKind::Snippet).await
    }

    /// Ask the backend to regenerate its netboot configuration.
    pub async fn sync(&self) -> Result<(), Error> {
        debug!("syncing netboot configuration");
        self.session.call("sync", vec![Arg::Token]).await?;
        Ok(())
    }
}

fn into_text(method: &str, value: Value) -> Result<String, Error> {
    match value {
        Value::String(text) => Ok(text),
        // An empty file comes back as "~", which the transport turns into null.
        Value::Null => Ok(String::new()),
        other => Err(Error::Decoding {
            message: format!("{method} returned {other} instead of text"),
        }),
    }
}

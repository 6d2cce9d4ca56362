//! Template and snippet command handlers.

use std::io::Read;
use std::path::Path;

use pserv_core::{ProvisioningApi, TemplateKind};

use crate::cli::{GlobalOpts, TemplatesArgs, TemplatesCommand};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    api: &ProvisioningApi,
    kind: TemplateKind,
    args: TemplatesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        TemplatesCommand::List => {
            let paths = api.list_templates(kind).await?;
            let out = output::render_names(&global.output, &paths)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TemplatesCommand::Read { path } => {
            let contents = api.read_template(kind, &path).await?;
            output::print_output(contents.trim_end_matches('\n'), global.quiet);
            Ok(())
        }

        TemplatesCommand::Write { path, file } => {
            let contents = read_source(&file)?;
            api.write_template(kind, &path, &contents).await?;
            if !global.quiet {
                eprintln!("Wrote {} bytes to {path}", contents.len());
            }
            Ok(())
        }
    }
}

/// Read a local file, or stdin for "-".
fn read_source(file: &Path) -> Result<String, CliError> {
    if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.ks");
        std::fs::write(&path, "install\n").unwrap();

        assert_eq!(read_source(&path).unwrap(), "install\n");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_source(Path::new("/nonexistent/pserv/sample.ks")).unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }
}

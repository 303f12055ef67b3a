//! HTML to PDF conversion through a headless browser subprocess.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use quizrelay_shared::{QuizRelayError, Result};

/// Print `html_path` to `pdf_path` with `browser` in headless mode.
#[instrument(skip_all, fields(browser = %browser, out = %pdf_path.display()))]
pub async fn convert(browser: &str, html_path: &Path, pdf_path: &Path, timeout: Duration) -> Result<()> {
    let input = std::fs::canonicalize(html_path).map_err(|e| QuizRelayError::io(html_path, e))?;

    let mut command = Command::new(browser);
    command
        .arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--no-pdf-header-footer")
        .arg(format!("--print-to-pdf={}", pdf_path.display()))
        .arg(format!("file://{}", input.display()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!("converting document to PDF");
    let child = command.spawn().map_err(|e| {
        QuizRelayError::Render(format!("failed to spawn `{browser}`: {e}. Is it installed?"))
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            QuizRelayError::Render(format!("PDF conversion timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|e| QuizRelayError::Render(format!("PDF converter failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(QuizRelayError::Render(format!(
            "PDF converter exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let size = std::fs::metadata(pdf_path)
        .map_err(|e| QuizRelayError::Render(format!("converter produced no PDF: {e}")))?
        .len();
    if size == 0 {
        return Err(QuizRelayError::Render("converter produced an empty PDF".into()));
    }

    debug!(size, "PDF written");
    Ok(())
}

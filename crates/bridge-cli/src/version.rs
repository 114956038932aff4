use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::CliError;

/// Run `<path> --version` and return its trimmed output
///
/// # Errors
///
/// Returns [`CliError::NotFound`] when the executable is missing, a timeout
/// error when it does not answer within `limit`, and an execution error for a
/// non-zero exit
pub async fn probe_version(path: &Path, limit: Duration) -> Result<String, CliError> {
    let run = async {
        let mut attempt = 0;
        loop {
            let result = tokio::process::Command::new(path)
                .arg("--version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await;
            match result {
                Err(e) if crate::supervisor::is_text_busy(&e) && attempt < 4 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                result => return result,
            }
        }
    };

    let output = match tokio::time::timeout(limit, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if matches!(e.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied) => {
            return Err(CliError::NotFound {
                path: path.display().to_string(),
            });
        }
        Ok(Err(e)) => return Err(CliError::Io(e)),
        Err(_) => {
            return Err(CliError::Timeout {
                kind: crate::TimeoutKind::Deadline,
                limit,
            });
        }
    };

    if !output.status.success() {
        return Err(crate::classify_failure(
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
            None,
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

//! SSH signature verification via the `ssh-keygen -Y verify` external tool.

use std::io::Write;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Verify an SSH signature over `payload`.
///
/// Writes the armored signature and a single-principal allow-list to
/// uniquely named temporary files, then streams `payload` to
/// `ssh-keygen -Y verify` on stdin. Exit code 0 means valid.
///
/// The temp files are owned by `NamedTempFile` guards, so they are removed
/// on every exit path including subprocess spawn failure. Any failure along
/// the way (tool missing, malformed armor, non-zero exit) returns `false`;
/// this function never surfaces an error to the caller.
pub async fn verify_ssh_signature(
    payload: &[u8],
    signature: &str,
    public_key: &str,
    principal: &str,
) -> bool {
    match run_verify(payload, signature, public_key, principal).await {
        Ok(valid) => valid,
        Err(err) => {
            debug!(error = %err, "ssh signature verification degraded to invalid");
            false
        }
    }
}

async fn run_verify(
    payload: &[u8],
    signature: &str,
    public_key: &str,
    principal: &str,
) -> std::io::Result<bool> {
    // Unique per invocation: concurrent verifications never collide on a path.
    let mut sig_file = tempfile::Builder::new()
        .prefix("anvil-sig-")
        .suffix(".sig")
        .tempfile()?;
    sig_file.write_all(signature.as_bytes())?;
    sig_file.flush()?;

    let mut signers_file = tempfile::Builder::new()
        .prefix("anvil-signers-")
        .tempfile()?;
    writeln!(signers_file, "{principal} {public_key}")?;
    signers_file.flush()?;

    let mut child = Command::new("ssh-keygen")
        .arg("-Y")
        .arg("verify")
        .arg("-f")
        .arg(signers_file.path())
        .arg("-I")
        .arg(principal)
        .arg("-n")
        .arg("git")
        .arg("-s")
        .arg(sig_file.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(payload).await?;
        stdin.shutdown().await?;
    }

    let status = child.wait().await?;
    Ok(status.success())
}

//! Credential wrapping for delegated submissions.
//!
//! When a submission carries a delegated credential (a pilot proxy), the
//! executable is not submitted directly: it is wrapped in a bootstrap
//! script that materializes the credential on the remote node, points the
//! credential environment variable at it, execs the original payload, and
//! exits with the payload's status. [`CredentialWrapper`] is the seam —
//! the exact wrapper shape is a thin collaborator, not core logic.

use std::io;
use std::path::{Path, PathBuf};

/// A credential to be delegated to a remote submission.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Environment variable the payload expects the credential path in
    /// (e.g. `X509_USER_PROXY`).
    pub env_var: String,
    /// Bytes of the credential material itself.
    pub material: Vec<u8>,
    /// True for a shared "generic pilot" credential that needs periodic
    /// renewal during the run, as opposed to a single-use delegation.
    pub is_generic_pilot: bool,
}

/// Wraps a payload executable with a credential-bootstrapping script.
pub trait CredentialWrapper: Send + Sync {
    /// Write a self-contained wrapper script to a temporary path that:
    /// materializes `credential` on disk, exports `credential.env_var`
    /// pointing at it, execs `executable`, and exits with its status.
    /// Returns the wrapper's local path; the caller is responsible for
    /// removing it once dispatch completes.
    fn wrap(&self, executable: &Path, credential: &Credential) -> io::Result<PathBuf>;
}

/// A shell-script credential wrapper, the default used by the SSH
/// dispatcher when no other collaborator is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellCredentialWrapper;

impl CredentialWrapper for ShellCredentialWrapper {
    fn wrap(&self, executable: &Path, credential: &Credential) -> io::Result<PathBuf> {
        let dir = std::env::temp_dir();
        let wrapper_path = dir.join(format!(
            "jobwatch_wrapper_{}.sh",
            std::process::id()
        ));
        let credential_path = dir.join(format!("jobwatch_cred_{}.pem", std::process::id()));

        std::fs::write(&credential_path, &credential.material)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&credential_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let script = format!(
            "#!/bin/sh\nexport {env}=\"{cred}\"\nexec \"{exe}\" \"$@\"\n",
            env = credential.env_var,
            cred = credential_path.display(),
            exe = executable.display(),
        );
        std::fs::write(&wrapper_path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&wrapper_path, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(wrapper_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_produces_a_self_contained_script() {
        let wrapper = ShellCredentialWrapper;
        let credential = Credential {
            env_var: "X509_USER_PROXY".to_string(),
            material: b"fake-proxy-bytes".to_vec(),
            is_generic_pilot: true,
        };
        let exe = Path::new("/usr/bin/true");
        let path = wrapper.wrap(exe, &credential).expect("wrap succeeds");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("X509_USER_PROXY"));
        assert!(contents.contains("/usr/bin/true"));
        assert!(contents.starts_with("#!/bin/sh"));
        std::fs::remove_file(&path).ok();
    }
}

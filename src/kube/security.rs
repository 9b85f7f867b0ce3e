use rcgen::{CertificateParams, DnType, KeyPair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::user_config::ConfigService;

const CERT_FILE: &str = "kubeCert.pem";
const KEY_FILE: &str = "kubeKey.pem";
const CSR_FILE: &str = "kubeCsr.pem";
const SUBJECT_ALT_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// mTLS material for the local HTTPS listener of every kube daemon on
/// this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeDaemonSecurityConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub csr_path: PathBuf,
    pub token: String,
}

impl KubeDaemonSecurityConfig {
    fn files_exist(&self) -> bool {
        [&self.cert_path, &self.key_path, &self.csr_path]
            .iter()
            .all(|p| p.exists())
    }
}

/// Current kube daemon security settings, regenerating them when needed.
///
/// Cert, key and CSR are regenerated when `force` is set, when nothing is
/// stored yet, or when any of the three files is gone. The token is kept
/// across a missing-file regeneration and rotated otherwise. When nothing
/// needs regenerating the stored settings are returned without a write.
pub fn get_security_settings(config: &ConfigService, force: bool) -> Result<KubeDaemonSecurityConfig> {
    let stored = config.kube_daemon_security_config()?;

    let token = match &stored {
        Some(settings) if !force => {
            if settings.files_exist() {
                debug!("Kube daemon security settings are up to date");
                return Ok(settings.clone());
            }
            info!("Kube daemon certificate files are missing, regenerating");
            settings.token.clone()
        }
        _ => {
            info!(force, "Generating kube daemon security settings");
            generate_token()
        }
    };
    let token = if token.is_empty() { generate_token() } else { token };

    let settings = generate_settings(&config.config_dir(), token)?;
    config.set_kube_daemon_security_config(settings.clone())?;
    Ok(settings)
}

fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn generate_settings(dir: &Path, token: String) -> Result<KubeDaemonSecurityConfig> {
    fs::create_dir_all(dir)?;

    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(
        SUBJECT_ALT_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    )?;
    params
        .distinguished_name
        .push(DnType::CommonName, SUBJECT_ALT_NAMES[0]);

    let csr_pem = params.serialize_request(&key_pair)?.pem()?;
    let cert_pem = params.self_signed(&key_pair)?.pem();

    let settings = KubeDaemonSecurityConfig {
        cert_path: dir.join(CERT_FILE),
        key_path: dir.join(KEY_FILE),
        csr_path: dir.join(CSR_FILE),
        token,
    };

    write_private(&settings.key_path, &key_pair.serialize_pem())?;
    fs::write(&settings.csr_path, csr_pem)?;
    fs::write(&settings.cert_path, cert_pem)?;

    debug!(dir = %dir.display(), "Wrote kube daemon certificate files");
    Ok(settings)
}

/// Write a file readable only by the current user.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

use anyhow::{bail, Result};
use sequoia_openpgp::{
    parse::{stream::*, Parse},
    policy::StandardPolicy,
    Cert, KeyHandle,
};
use std::path::{Path, PathBuf};

/// Check a detached signature of `data` against the trusted certificates
pub fn verify_detached(keyring: &[PathBuf], data: &Path, sig: &Path) -> Result<()> {
    if !sig.is_file() {
        bail!(
            "Signature {} not found",
            console::style(sig.display()).bold().to_string()
        );
    }

    let verifier = DetachedSigVerifier::new(keyring)?;
    let p = &StandardPolicy::new();
    let mut v = DetachedVerifierBuilder::from_file(sig)?.with_policy(p, None, verifier)?;
    v.verify_file(data)?;

    Ok(())
}

pub struct DetachedSigVerifier {
    certs: Vec<Cert>,
}

impl DetachedSigVerifier {
    pub fn new<P: AsRef<Path>>(cert_paths: &[P]) -> Result<Self> {
        if cert_paths.is_empty() {
            bail!("No trusted key configured, cannot verify signatures");
        }
        let mut certs: Vec<Cert> = Vec::new();
        for path in cert_paths.iter() {
            certs.push(Cert::from_file(path)?);
        }
        Ok(DetachedSigVerifier { certs })
    }
}

impl VerificationHelper for DetachedSigVerifier {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> Result<Vec<Cert>> {
        // Signatures are usually made by subkeys, let sequoia do the matching
        Ok(self.certs.clone())
    }

    fn check(&mut self, structure: MessageStructure) -> Result<()> {
        let mut good = 0;
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for r in results {
                    match r {
                        Ok(_) => good += 1,
                        Err(e) => bail!("Package has bad signature: {}", e),
                    }
                }
            } else {
                bail!("Malformed PGP signature, expected a detached signature")
            }
        }

        if good == 0 {
            bail!("No valid signature found");
        }
        Ok(())
    }
}

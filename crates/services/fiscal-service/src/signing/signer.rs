//! Enveloped XML-DSig (RSA-SHA1, C14N 1.0) as required by the NF-e layout.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1v15::{SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};

use domain::DSIG_NAMESPACE;

use super::{Credential, SigningError};
use crate::xml::XmlWriter;

const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Computed signature of one referenced element.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub reference_id: String,
    /// Base64 SHA-1 of the canonical referenced element
    pub digest_value: String,
    pub signature_value: String,
    pub certificate: String,
}

impl Signature {
    /// `<Signature>` element placed after the referenced element.
    pub fn to_xml(&self) -> Result<String, SigningError> {
        let mut w = XmlWriter::new();
        w.open("Signature", &[("xmlns", DSIG_NAMESPACE)])?;
        w.raw(&signed_info(&self.reference_id, &self.digest_value, false)?);
        w.leaf_exact("SignatureValue", &self.signature_value)?;
        w.group("KeyInfo", &[], |w| {
            w.group("X509Data", &[], |w| w.leaf_exact("X509Certificate", &self.certificate))
        })?;
        w.close("Signature")?;
        Ok(w.finish()?)
    }
}

/// `SignedInfo`; the canonical form declares the dsig namespace it
/// inherits from `Signature`.
fn signed_info(reference_id: &str, digest_value: &str, canonical: bool) -> Result<String, SigningError> {
    let uri = format!("#{}", reference_id);
    let mut w = XmlWriter::new();
    let attrs: &[(&str, &str)] = if canonical {
        &[("xmlns", DSIG_NAMESPACE)]
    } else {
        &[]
    };
    w.group("SignedInfo", attrs, |w| {
        w.group("CanonicalizationMethod", &[("Algorithm", C14N)], |_| Ok(()))?;
        w.group("SignatureMethod", &[("Algorithm", RSA_SHA1)], |_| Ok(()))?;
        w.group("Reference", &[("URI", uri.as_str())], |w| {
            w.group("Transforms", &[], |w| {
                w.group("Transform", &[("Algorithm", ENVELOPED)], |_| Ok(()))?;
                w.group("Transform", &[("Algorithm", C14N)], |_| Ok(()))
            })?;
            w.group("DigestMethod", &[("Algorithm", SHA1)], |_| Ok(()))?;
            w.leaf_exact("DigestValue", digest_value)
        })
    })?;
    Ok(w.finish()?)
}

fn digest(canonical_xml: &str) -> String {
    STANDARD.encode(Sha1::digest(canonical_xml.as_bytes()))
}

/// Signs canonical XML fragments.
pub trait XmlSigner: Send + Sync {
    /// Sign `canonical_xml`, the C14N form of the element whose `Id` is
    /// `reference_id`.
    fn sign(&self, reference_id: &str, canonical_xml: &str) -> Result<Signature, SigningError>;
}

/// RSASSA-PKCS1-v1_5 with SHA-1.
pub struct RsaSha1Signer {
    credential: Arc<Credential>,
}

impl RsaSha1Signer {
    pub fn new(credential: Arc<Credential>) -> Self {
        Self { credential }
    }
}

impl XmlSigner for RsaSha1Signer {
    fn sign(&self, reference_id: &str, canonical_xml: &str) -> Result<Signature, SigningError> {
        let digest_value = digest(canonical_xml);
        let info = signed_info(reference_id, &digest_value, true)?;

        let key = SigningKey::<Sha1>::new(self.credential.private_key().clone());
        let raw = key
            .try_sign(info.as_bytes())
            .map_err(|e| SigningError::Sign(e.to_string()))?;

        Ok(Signature {
            reference_id: reference_id.to_string(),
            digest_value,
            signature_value: STANDARD.encode(raw.to_bytes()),
            certificate: self.credential.certificate_base64(),
        })
    }
}

/// Check digest and signature of `canonical_xml` against `public_key`.
pub fn verify(
    signature: &Signature,
    canonical_xml: &str,
    public_key: &RsaPublicKey,
) -> Result<(), SigningError> {
    if digest(canonical_xml) != signature.digest_value {
        return Err(SigningError::Verify("digest differs".into()));
    }
    let info = signed_info(&signature.reference_id, &signature.digest_value, true)?;
    let bytes = STANDARD
        .decode(&signature.signature_value)
        .map_err(|e| SigningError::Verify(e.to_string()))?;
    let sig = rsa::pkcs1v15::Signature::try_from(bytes.as_slice())
        .map_err(|e| SigningError::Verify(e.to_string()))?;
    VerifyingKey::<Sha1>::new(public_key.clone())
        .verify(info.as_bytes(), &sig)
        .map_err(|e| SigningError::Verify(e.to_string()))
}

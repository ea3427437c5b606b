// Keystore - signing key files, optionally age-encrypted with a passphrase
//
// Decrypted key material only ever lives in `Zeroizing` buffers and is handed
// straight to `SigningSecret`, which owns it from then on.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use age::secrecy::SecretString;
use anyhow::{bail, Context, Result};
use ed25519_dalek::SigningKey;
use provgraph_crypto::{signing_key_to_pem, SigningSecret};
use zeroize::Zeroizing;

/// Environment variable consulted before prompting for a passphrase
pub const PASSPHRASE_ENV: &str = "PROVGRAPH_KEY_PASSPHRASE";

/// Header of age's binary format
const AGE_MAGIC: &[u8] = b"age-encryption.org/v1";

/// Encrypts key bytes with a passphrase using age encryption.
pub fn encrypt_key(key_bytes: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_user_passphrase(SecretString::from(passphrase.to_string()));

    let mut encrypted = vec![];
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .context("Failed to create age encryptor")?;

    writer
        .write_all(key_bytes)
        .context("Failed to write key bytes to encryptor")?;

    writer.finish().context("Failed to finalize encryption")?;

    Ok(encrypted)
}

/// Decrypts an age passphrase file into a zeroizing buffer.
pub fn decrypt_key(encrypted: &[u8], passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    let decryptor = match age::Decryptor::new(encrypted).context("Failed to read age header")? {
        age::Decryptor::Passphrase(d) => d,
        _ => bail!("Key file is age-encrypted to recipients, not a passphrase"),
    };

    let mut reader = decryptor
        .decrypt(&SecretString::from(passphrase.to_string()), None)
        .context("Failed to decrypt key (wrong passphrase?)")?;

    let mut decrypted = Zeroizing::new(Vec::new());
    reader
        .read_to_end(&mut decrypted)
        .context("Failed to read decrypted key")?;

    Ok(decrypted)
}

pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(AGE_MAGIC)
}

/// Loads a signing key file, decrypting it first when it is age-encrypted.
pub fn load_signing_secret(path: &Path) -> Result<SigningSecret> {
    let raw = Zeroizing::new(
        fs::read(path).with_context(|| format!("Failed to read key file '{}'", path.display()))?,
    );

    let material = if is_encrypted(&raw) {
        let passphrase = passphrase(&format!("Passphrase for {}: ", path.display()))?;
        decrypt_key(&raw, &passphrase)?
    } else {
        raw
    };

    SigningSecret::from_bytes(material)
        .with_context(|| format!("'{}' is not a usable Ed25519 signing key", path.display()))
}

/// Writes a PKCS#8 PEM signing key, age-encrypted when `encrypt` is set.
pub fn write_signing_key(path: &Path, signing_key: &SigningKey, encrypt: bool) -> Result<()> {
    let pem = signing_key_to_pem(signing_key).context("Failed to encode signing key")?;

    let contents: Zeroizing<Vec<u8>> = if encrypt {
        let passphrase = new_passphrase()?;
        Zeroizing::new(encrypt_key(pem.as_bytes(), &passphrase)?)
    } else {
        Zeroizing::new(pem.as_bytes().to_vec())
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to create key file '{}'", path.display()))?;
        file.write_all(&contents)?;
    }

    #[cfg(not(unix))]
    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Failed to create key file '{}'", path.display()))?;
        file.write_all(&contents)?;
    }

    Ok(())
}

/// Passphrase from the environment, or prompted without echo.
fn passphrase(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        return Ok(Zeroizing::new(value));
    }
    let entered = rpassword::prompt_password(prompt).context("Failed to read passphrase")?;
    Ok(Zeroizing::new(entered))
}

/// Passphrase for a new key: prompted twice unless taken from the environment.
fn new_passphrase() -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        if value.is_empty() {
            bail!("{} is set but empty", PASSPHRASE_ENV);
        }
        return Ok(Zeroizing::new(value));
    }

    let first = Zeroizing::new(
        rpassword::prompt_password("New passphrase: ").context("Failed to read passphrase")?,
    );
    if first.is_empty() {
        bail!("Passphrase must not be empty");
    }
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm passphrase: ").context("Failed to read passphrase")?,
    );
    if *first != *second {
        bail!("Passphrases do not match");
    }
    Ok(first)
}

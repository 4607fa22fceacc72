//! Private key password handling
//!
//! A configured password is either absent (key written in the clear), the
//! keyword `auto` (a random password is generated once per entity and
//! disclosed in a readme), or an explicit value.

use openssl::error::ErrorStack;
use openssl::rand::rand_bytes;
use secrecy::{ExposeSecret, SecretString};

pub const AUTO_PASSWORD_KEYWORD: &str = "auto";
pub const MIN_GENERATED_PASSWORD_LENGTH: usize = 12;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
// Largest multiple of the alphabet size that fits in a byte; bytes above are rejected.
const SAMPLE_LIMIT: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSpec {
    None,
    AutoGenerate,
    Explicit(String),
}

impl PasswordSpec {
    /// Entity setting first, then the configured default
    pub fn resolve(entity: Option<&str>, default: Option<&str>) -> Self {
        match entity.or(default).map(str::trim) {
            None | Some("") => PasswordSpec::None,
            Some(value) if value.eq_ignore_ascii_case(AUTO_PASSWORD_KEYWORD) => {
                PasswordSpec::AutoGenerate
            }
            Some(value) => PasswordSpec::Explicit(value.to_string()),
        }
    }

    /// Produces the password in effect for one entity, generating it if requested
    pub fn materialize(&self, generated_length: usize) -> Result<Option<KeyPassword>, ErrorStack> {
        match self {
            PasswordSpec::None => Ok(None),
            PasswordSpec::Explicit(value) => Ok(Some(KeyPassword {
                secret: SecretString::from(value.clone()),
                generated: false,
            })),
            PasswordSpec::AutoGenerate => Ok(Some(KeyPassword {
                secret: generate_password(generated_length)?,
                generated: true,
            })),
        }
    }
}

/// Password protecting one entity's private keys
#[derive(Debug)]
pub struct KeyPassword {
    secret: SecretString,
    generated: bool,
}

impl KeyPassword {
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn was_generated(&self) -> bool {
        self.generated
    }
}

/// Random `[A-Za-z0-9]` password with at least one upper-case letter, one
/// lower-case letter and one digit
pub fn generate_password(length: usize) -> Result<SecretString, ErrorStack> {
    let length = length.max(MIN_GENERATED_PASSWORD_LENGTH);
    loop {
        let candidate = random_alphanumeric(length)?;
        let has_upper = candidate.bytes().any(|b| b.is_ascii_uppercase());
        let has_lower = candidate.bytes().any(|b| b.is_ascii_lowercase());
        let has_digit = candidate.bytes().any(|b| b.is_ascii_digit());
        if has_upper && has_lower && has_digit {
            return Ok(SecretString::from(candidate));
        }
    }
}

fn random_alphanumeric(length: usize) -> Result<String, ErrorStack> {
    let mut out = String::with_capacity(length);
    let mut buffer = [0u8; 64];
    while out.len() < length {
        rand_bytes(&mut buffer)?;
        for byte in buffer {
            if byte < SAMPLE_LIMIT {
                out.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);
                if out.len() == length {
                    break;
                }
            }
        }
    }
    Ok(out)
}

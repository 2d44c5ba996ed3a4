//! Runtime configuration: credentials, targets, timeouts, and environment
//! overrides, plus the SSH algorithm lists used by the in-process transport.
//!
//! The algorithm lists favor compatibility over strictness. The devices
//! this tool manages are often aged embedded systems that only negotiate
//! legacy Diffie-Hellman groups, CBC ciphers, or DSA host keys.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};

/// Default SSH port for device connections.
pub const DEFAULT_PORT: u16 = 22;

pub const ENV_HOST: &str = "APREBOOT_HOST";
pub const ENV_USERNAME: &str = "APREBOOT_USERNAME";
pub const ENV_PASSWORD: &str = "APREBOOT_PASSWORD";
pub const ENV_PORT: &str = "APREBOOT_PORT";
pub const ENV_TIMEOUT: &str = "APREBOOT_TIMEOUT";
pub const ENV_REBOOT_TIMEOUT: &str = "APREBOOT_REBOOT_TIMEOUT";
pub const ENV_TRANSPORT: &str = "APREBOOT_TRANSPORT";

/// Login credentials shared read-only across a batch run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One addressable device: host plus SSH port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
}

impl DeviceTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Time budgets for the session phases and batch pacing.
///
/// `connect` bounds the wait for the first login prompt, `shell_prompt` the
/// wait for the authenticated shell marker, `command` ordinary commands,
/// `reboot` the acknowledgement of a reboot command, and `pacing` the delay
/// inserted between consecutive devices in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub shell_prompt: Duration,
    pub command: Duration,
    pub reboot: Duration,
    pub pacing: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            shell_prompt: Duration::from_secs(10),
            command: Duration::from_secs(30),
            reboot: Duration::from_secs(60),
            pacing: Duration::from_secs(2),
        }
    }
}

/// Optional settings read from `APREBOOT_*` environment variables.
///
/// Command-line flags take precedence over these values. Unparsable numeric
/// values are logged and ignored rather than aborting the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub connect_timeout: Option<u64>,
    pub reboot_timeout: Option<u64>,
    pub transport: Option<String>,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup(ENV_HOST),
            username: lookup(ENV_USERNAME),
            password: lookup(ENV_PASSWORD),
            port: lookup(ENV_PORT).and_then(|raw| parse_env(ENV_PORT, &raw)),
            connect_timeout: lookup(ENV_TIMEOUT).and_then(|raw| parse_env(ENV_TIMEOUT, &raw)),
            reboot_timeout: lookup(ENV_REBOOT_TIMEOUT)
                .and_then(|raw| parse_env(ENV_REBOOT_TIMEOUT, &raw)),
            transport: lookup(ENV_TRANSPORT),
        }
    }

    /// Applies the timeout overrides on top of `base`.
    pub fn apply_timeouts(&self, base: Timeouts) -> Timeouts {
        let mut timeouts = base;
        if let Some(secs) = self.connect_timeout {
            timeouts.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = self.reboot_timeout {
            timeouts.reboot = Duration::from_secs(secs);
        }
        timeouts
    }
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {name}: cannot parse {raw:?}");
            None
        }
    }
}

/// Key exchange algorithms in order of preference.
///
/// Includes modern algorithms like Curve25519 as well as legacy
/// Diffie-Hellman variants for compatibility with older devices.
pub const COMPAT_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Cipher algorithms for encryption.
///
/// Includes modern ciphers like AES-GCM and ChaCha20-Poly1305, as well as
/// legacy CBC mode ciphers for compatibility with older devices. Null
/// ciphers are never offered.
pub const COMPAT_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

/// MAC algorithms, standard HMAC variants plus ETM variants.
pub const COMPAT_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

/// Compression algorithms, ZLIB variants plus none.
pub const COMPAT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

/// Host key algorithms.
///
/// Includes modern algorithms like Ed25519 and ECDSA, as well as legacy
/// RSA and DSA for compatibility with older devices.
pub const COMPAT_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

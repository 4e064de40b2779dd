//! Pluggable flight-authorisation validators.

use thiserror::Error;

use crate::planning::FlightAuthorisationData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorisationError {
    #[error("invalid UAS serial number '{0}'")]
    SerialNumber(String),
    #[error("invalid operator registration '{0}'")]
    OperatorRegistration(String),
}

pub trait AuthorisationValidator: Send + Sync {
    fn validate(&self, data: &FlightAuthorisationData) -> Result<(), AuthorisationError>;
}

/// ANSI/CTA-2063-A physical serial number.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialNumberValidator;

const SERIAL_ALPHABET: &str = "0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

impl SerialNumberValidator {
    pub fn is_valid(serial: &str) -> bool {
        if !serial.chars().all(|c| SERIAL_ALPHABET.contains(c)) {
            return false;
        }
        let bytes = serial.as_bytes();
        if bytes.len() < 6 {
            return false;
        }
        let length = match (bytes[4] as char).to_digit(16) {
            Some(0) | None => return false,
            Some(n) => n as usize,
        };
        bytes.len() == 5 + length
    }
}

impl AuthorisationValidator for SerialNumberValidator {
    fn validate(&self, data: &FlightAuthorisationData) -> Result<(), AuthorisationError> {
        if Self::is_valid(&data.uas_serial_number) {
            Ok(())
        } else {
            Err(AuthorisationError::SerialNumber(
                data.uas_serial_number.clone(),
            ))
        }
    }
}

/// EN 4709-02 operator registration number.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorRegistrationValidator;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl OperatorRegistrationValidator {
    /// Control character over `payload` (base id followed by the secret).
    pub fn checksum(payload: &str) -> Option<char> {
        let mut sum: u32 = 0;
        for (i, c) in payload.chars().enumerate() {
            let code = BASE36_ALPHABET
                .iter()
                .position(|&b| b as char == c.to_ascii_lowercase())? as u32;
            let factor = if i % 2 == 0 { 2 } else { 1 };
            let addend = factor * code;
            sum += addend / 36 + addend % 36;
        }
        let control = (36 - sum % 36) % 36;
        Some(BASE36_ALPHABET[control as usize] as char)
    }

    pub fn is_valid(operator_id: &str) -> bool {
        let Some((public, secret)) = operator_id.split_once('-') else {
            return false;
        };
        if public.len() != 16 || secret.len() != 3 || !public.is_ascii() {
            return false;
        }
        let (country, rest) = public.split_at(3);
        let (base_id, check) = rest.split_at(12);
        if !country.chars().all(|c| c.is_ascii_uppercase())
            || !base_id.chars().all(|c| c.is_ascii_alphanumeric())
            || !secret.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return false;
        }
        let payload = format!("{}{}", base_id, secret);
        match (Self::checksum(&payload), check.chars().next()) {
            (Some(expected), Some(actual)) => expected == actual.to_ascii_lowercase(),
            _ => false,
        }
    }
}

impl AuthorisationValidator for OperatorRegistrationValidator {
    fn validate(&self, data: &FlightAuthorisationData) -> Result<(), AuthorisationError> {
        if Self::is_valid(&data.operator_id) {
            Ok(())
        } else {
            Err(AuthorisationError::OperatorRegistration(
                data.operator_id.clone(),
            ))
        }
    }
}

/// Runs validators in order and stops at the first failure.
pub struct AuthorisationChain {
    validators: Vec<Box<dyn AuthorisationValidator>>,
}

impl AuthorisationChain {
    pub fn new(validators: Vec<Box<dyn AuthorisationValidator>>) -> Self {
        Self { validators }
    }

    pub fn validate(&self, data: &FlightAuthorisationData) -> Result<(), AuthorisationError> {
        self.validators
            .iter()
            .try_for_each(|validator| validator.validate(data))
    }
}

impl Default for AuthorisationChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SerialNumberValidator),
            Box::new(OperatorRegistrationValidator),
        ])
    }
}

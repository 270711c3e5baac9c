//! Withdrawal wallet address validation.
//!
//! Addresses are checked structurally only: one fixed leading character
//! followed by exactly [`ADDRESS_BODY_LEN`] characters of the base58
//! alphabet (case-sensitive; no `0`, `O`, `I`, or `l`). The check is cheap
//! and runs client-side before any network call, so malformed addresses
//! never consume an audited gate attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Required leading character of a withdrawal address.
pub const ADDRESS_PREFIX: char = 'T';

/// Number of characters after the prefix.
pub const ADDRESS_BODY_LEN: usize = 33;

/// A withdrawal request, pre-validated before it reaches the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub profile_id: String,
    pub wallet_address: String,
    pub amount: f64,
}

/// Structural problems with a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletAddressError {
    #[error("wallet address must be {expected} characters, got {actual}", expected = ADDRESS_BODY_LEN + 1)]
    WrongLength { actual: usize },
    #[error("wallet address must start with '{ADDRESS_PREFIX}'")]
    WrongPrefix,
    #[error("wallet address contains invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

/// Validates the structural address format.
///
/// # Errors
///
/// Returns the first structural violation: wrong length, wrong leading
/// character, or a character outside the base58 alphabet.
pub fn validate_wallet_address(address: &str) -> Result<(), WalletAddressError> {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() != ADDRESS_BODY_LEN + 1 {
        return Err(WalletAddressError::WrongLength { actual: chars.len() });
    }
    if chars[0] != ADDRESS_PREFIX {
        return Err(WalletAddressError::WrongPrefix);
    }
    for (index, &ch) in chars.iter().enumerate().skip(1) {
        if !is_base58(ch) {
            return Err(WalletAddressError::InvalidCharacter { ch, index });
        }
    }
    Ok(())
}

fn is_base58(ch: char) -> bool {
    ch.is_ascii_alphanumeric() && !matches!(ch, '0' | 'O' | 'I' | 'l')
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "TJ7Hhzgz7y6N3pYUCqPuMBDeAAYaT2PYNE";

    #[test]
    fn accepts_well_formed_address() {
        assert_eq!(VALID.len(), ADDRESS_BODY_LEN + 1);
        assert_eq!(validate_wallet_address(VALID), Ok(()));
    }

    #[test]
    fn rejects_wrong_leading_character() {
        let address = format!("X{}", &VALID[1..]);
        assert_eq!(validate_wallet_address(&address), Err(WalletAddressError::WrongPrefix));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            validate_wallet_address("T123"),
            Err(WalletAddressError::WrongLength { actual: 4 })
        );
        let long = format!("{VALID}9");
        assert_eq!(
            validate_wallet_address(&long),
            Err(WalletAddressError::WrongLength { actual: 35 })
        );
        assert_eq!(
            validate_wallet_address(""),
            Err(WalletAddressError::WrongLength { actual: 0 })
        );
    }

    #[test]
    fn rejects_ambiguous_base58_characters() {
        for bad in ['0', 'O', 'I', 'l'] {
            let mut chars: Vec<char> = VALID.chars().collect();
            chars[5] = bad;
            let address: String = chars.into_iter().collect();
            assert_eq!(
                validate_wallet_address(&address),
                Err(WalletAddressError::InvalidCharacter { ch: bad, index: 5 })
            );
        }
    }

    #[test]
    fn rejects_non_alphanumeric_characters() {
        let mut chars: Vec<char> = VALID.chars().collect();
        chars[10] = '-';
        let address: String = chars.into_iter().collect();
        assert!(matches!(
            validate_wallet_address(&address),
            Err(WalletAddressError::InvalidCharacter { ch: '-', index: 10 })
        ));
    }
}

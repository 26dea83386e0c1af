//! Wallet session
//!
//! Holds the signer address a dashboard user has connected and notifies
//! subscribers when it changes. One session per connected client; nothing
//! here is global.

use tokio::sync::watch;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const MAINNET_PREFIX: &str = "addr1";
const TESTNET_PREFIX: &str = "addr_test1";
const MIN_DATA_LEN: usize = 20;

/// Syntactic check for a Shelley-era bech32 payment address.
///
/// Does not verify the checksum; the chain signer is the authority on
/// whether an address is spendable.
pub fn is_valid_cardano_address(address: &str) -> bool {
    let data = if let Some(rest) = address.strip_prefix(TESTNET_PREFIX) {
        rest
    } else if let Some(rest) = address.strip_prefix(MAINNET_PREFIX) {
        rest
    } else {
        return false;
    };

    data.len() >= MIN_DATA_LEN && data.chars().all(|c| BECH32_CHARSET.contains(c))
}

/// The connected signer identity of one client
#[derive(Debug)]
pub struct WalletSession {
    tx: watch::Sender<Option<String>>,
}

impl WalletSession {
    /// A session with no wallet connected
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Connect `address`, replacing any previous one. Rejects malformed
    /// addresses without touching the current state.
    pub fn connect(&self, address: &str) -> Result<(), String> {
        let address = address.trim();
        if !is_valid_cardano_address(address) {
            return Err(format!("invalid Cardano address format: {}", address));
        }
        self.tx.send_replace(Some(address.to_string()));
        Ok(())
    }

    pub fn disconnect(&self) {
        self.tx.send_replace(None);
    }

    /// Currently connected address
    pub fn address(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every connect/disconnect
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_A: &str = "addr_test1qz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3jcu5d8ps7zex2k2xt3uqxgjqnnj83ws8lhrn648jjxtwq2ytjqp";
    const ADDR_B: &str = "addr1qx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3jcu5d8ps7zex2k2xt3uqxgjqnnj83ws8lhrn648jjxtwqfjkjv7";

    #[test]
    fn test_address_validation() {
        assert!(is_valid_cardano_address(ADDR_A));
        assert!(is_valid_cardano_address(ADDR_B));
        assert!(!is_valid_cardano_address(""));
        assert!(!is_valid_cardano_address("addr_test1short"));
        assert!(!is_valid_cardano_address("stake1uxyz"));
        // 'b', 'i', 'o' and '1' are outside the bech32 data charset
        assert!(!is_valid_cardano_address(
            "addr_test1qz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3jcu5d8ps7zex2k2xt3uqxgjqnnj8bio"
        ));
    }

    #[test]
    fn test_connect_and_disconnect() {
        let session = WalletSession::new();
        assert!(session.address().is_none());

        session.connect(ADDR_A).unwrap();
        assert_eq!(session.address().as_deref(), Some(ADDR_A));

        session.disconnect();
        assert!(session.address().is_none());
    }

    #[test]
    fn test_invalid_connect_keeps_previous_address() {
        let session = WalletSession::new();
        session.connect(ADDR_A).unwrap();

        assert!(session.connect("not-an-address").is_err());
        assert_eq!(session.address().as_deref(), Some(ADDR_A));
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let session = WalletSession::new();
        let mut rx = session.subscribe();

        session.connect(ADDR_B).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some(ADDR_B));

        session.disconnect();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }
}

//! Secret store that decrypts an envelope-encrypted client secret through a key-management
//! service.
//!
//! The KMS client itself is abstracted behind [`KmsDecrypt`] so services can plug in whichever
//! SDK they already ship.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::ClientCredentials,
	store::{SecretStore, StoreError, StoreFuture},
};

const STORE: &str = "kms";

/// Envelope-decryption capability.
pub trait KmsDecrypt
where
	Self: Send + Sync,
{
	/// Decrypts `ciphertext`, yielding `None` when the service returns no plaintext.
	fn decrypt<'a>(
		&'a self,
		ciphertext: Bytes,
		key_id: Option<&'a str>,
	) -> StoreFuture<'a, Option<Bytes>>;
}
impl<K> KmsDecrypt for Arc<K>
where
	K: ?Sized + KmsDecrypt,
{
	fn decrypt<'a>(
		&'a self,
		ciphertext: Bytes,
		key_id: Option<&'a str>,
	) -> StoreFuture<'a, Option<Bytes>> {
		K::decrypt(self, ciphertext, key_id)
	}
}

/// Settings for [`KmsSecretStore`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct KmsSecretConfig {
	/// Client identifier paired with the decrypted secret.
	pub client_id: String,
	/// Base64-encoded ciphertext of the client secret.
	pub encrypted_client_secret: String,
	/// Key identifier forwarded to the decrypt call, when the ciphertext does not embed it.
	#[serde(default)]
	pub key_id: Option<String>,
}

/// [`SecretStore`] that decrypts the configured client secret on every fetch.
#[derive(Debug)]
pub struct KmsSecretStore<K>
where
	K: KmsDecrypt,
{
	kms: K,
	config: KmsSecretConfig,
}
impl<K> KmsSecretStore<K>
where
	K: KmsDecrypt,
{
	/// Creates a store using `kms` to decrypt `config.encrypted_client_secret`.
	pub fn new(kms: K, config: KmsSecretConfig) -> Self {
		Self { kms, config }
	}

	async fn fetch(&self) -> Result<ClientCredentials, StoreError> {
		let ciphertext = STANDARD.decode(self.config.encrypted_client_secret.trim()).map_err(|_| {
			StoreError::Malformed {
				store: STORE.into(),
				message: "encrypted client secret is not valid base64".into(),
			}
		})?;
		let plaintext = self
			.kms
			.decrypt(Bytes::from(ciphertext), self.config.key_id.as_deref())
			.await?
			.filter(|plaintext| !plaintext.is_empty())
			.ok_or_else(|| StoreError::MissingSecret {
				store: STORE.into(),
				message: "decrypt call returned no plaintext".into(),
			})?;
		let secret = String::from_utf8(plaintext.to_vec()).map_err(|e| StoreError::Malformed {
			store: STORE.into(),
			message: format!(
				"decrypted client secret is not valid UTF-8 after {} bytes",
				e.utf8_error().valid_up_to()
			),
		})?;

		Ok(ClientCredentials::new(self.config.client_id.clone(), secret))
	}
}
impl<K> SecretStore for KmsSecretStore<K>
where
	K: KmsDecrypt,
{
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials> {
		Box::pin(self.fetch())
	}
}

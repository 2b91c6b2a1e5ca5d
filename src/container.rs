//! Container handles cached per endpoint, database and container name.
//!
//! [`ContainerAccessor`] is the front door. It keeps one handle per [`ContainerKey`] in a [`KeyedCache`], fills the
//! defaults for endpoint, account key and database from [`ContainerSettings`], and adds listing and deletion on top.
//! Everything that talks to the actual database goes through a [`ContainerBackend`] implementation.
//!
//! [`KeyedCache`]: crate::KeyedCache

pub mod accessor;
pub mod backend;
pub mod key;
pub mod settings;

#[doc(inline)]
pub use accessor::AccessorError;
#[doc(inline)]
pub use accessor::ContainerAccessor;
#[doc(inline)]
pub use accessor::ContainerFactory;
#[doc(inline)]
pub use backend::ContainerBackend;
#[doc(inline)]
pub use key::ContainerArgs;
#[doc(inline)]
pub use key::ContainerKey;
#[doc(inline)]
pub use key::ContainerProperties;
#[doc(inline)]
pub use settings::ContainerSettings;
#[doc(inline)]
pub use settings::SettingsError;

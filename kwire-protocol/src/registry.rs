//! Type registry: which kinds exist, which versions they support, and how
//! each (kind, version) pair is encoded and decoded.
//!
//! Decoders are looked up by API key, encoders by the concrete Rust type of
//! the message being written. An override type is registered under an
//! existing key with its own encoder; reading its bytes back always yields
//! the base type.

use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::{Message, MessageRole};
use crate::messages::{apiversions, createpartitions, deletetopics, produce, rawproduce};
use crate::wire::{Decode, Encode, Reader, Writer};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

pub type DecodeFn = fn(&mut Reader, i16) -> Result<Box<dyn Message>, ProtocolError>;
pub type EncodeFn = fn(&dyn Message, &mut Writer<'_>, i16) -> Result<(), ProtocolError>;

fn decode_as<T: Message + Decode>(r: &mut Reader, version: i16) -> Result<Box<dyn Message>, ProtocolError> {
    Ok(Box::new(T::decode(r, version)?))
}

fn encode_as<T: Message + Encode>(
    msg: &dyn Message,
    w: &mut Writer<'_>,
    version: i16,
) -> Result<(), ProtocolError> {
    let typed = msg
        .downcast_ref::<T>()
        .ok_or(ProtocolError::UnregisteredType(msg.type_name()))?;
    typed.encode(w, version)
}

/// Supported versions and decoders of one kind.
pub struct ApiType {
    key: ApiKey,
    min_version: i16,
    max_version: i16,
    flexible_since: Option<i16>,
    decode_request: DecodeFn,
    decode_response: DecodeFn,
}

impl ApiType {
    pub fn key(&self) -> ApiKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn min_version(&self) -> i16 {
        self.min_version
    }

    pub fn max_version(&self) -> i16 {
        self.max_version
    }

    pub fn versions(&self) -> RangeInclusive<i16> {
        self.min_version..=self.max_version
    }

    pub fn supports(&self, version: i16) -> bool {
        self.versions().contains(&version)
    }

    pub fn check_version(&self, version: i16) -> Result<(), ProtocolError> {
        if self.supports(version) {
            return Ok(());
        }
        Err(ProtocolError::UnsupportedVersion {
            api: self.name(),
            version,
            min: self.min_version,
            max: self.max_version,
        })
    }

    /// Whether `version` uses compact lengths and tagged fields.
    pub fn is_flexible(&self, version: i16) -> bool {
        matches!(self.flexible_since, Some(v) if version >= v)
    }

    /// Whether the response header of `version` carries a tagged-field
    /// section. ApiVersions keeps the legacy header so clients can parse it
    /// before versions are negotiated.
    pub fn response_header_flexible(&self, version: i16) -> bool {
        self.key != ApiKey::ApiVersions && self.is_flexible(version)
    }

    /// Highest version both this codec and a peer supporting up to
    /// `peer_max` can speak.
    pub fn negotiate(&self, peer_max: i16) -> Option<i16> {
        let version = peer_max.min(self.max_version);
        (version >= self.min_version).then_some(version)
    }

    pub fn decoder(&self, role: MessageRole) -> DecodeFn {
        match role {
            MessageRole::Request => self.decode_request,
            MessageRole::Response => self.decode_response,
        }
    }
}

impl fmt::Debug for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiType")
            .field("key", &self.key)
            .field("versions", &self.versions())
            .field("flexible_since", &self.flexible_since)
            .finish()
    }
}

struct TypeEntry {
    type_name: &'static str,
    key: ApiKey,
    role: MessageRole,
    min_version: i16,
    max_version: i16,
    is_override: bool,
    encode: EncodeFn,
}

/// Immutable lookup tables for every registered kind and type.
pub struct Registry {
    apis: BTreeMap<ApiKey, ApiType>,
    types: HashMap<TypeId, TypeEntry>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every kind this crate implements, plus the raw produce override.
    pub fn standard() -> Self {
        Self::builder()
            .api::<produce::Request, produce::Response>(
                ApiKey::Produce,
                produce::MIN_VERSION..=produce::MAX_VERSION,
                Some(produce::FLEXIBLE_SINCE),
            )
            .api::<apiversions::Request, apiversions::Response>(
                ApiKey::ApiVersions,
                apiversions::MIN_VERSION..=apiversions::MAX_VERSION,
                Some(apiversions::FLEXIBLE_SINCE),
            )
            .api::<deletetopics::Request, deletetopics::Response>(
                ApiKey::DeleteTopics,
                deletetopics::MIN_VERSION..=deletetopics::MAX_VERSION,
                Some(deletetopics::FLEXIBLE_SINCE),
            )
            .api::<createpartitions::Request, createpartitions::Response>(
                ApiKey::CreatePartitions,
                createpartitions::MIN_VERSION..=createpartitions::MAX_VERSION,
                Some(createpartitions::FLEXIBLE_SINCE),
            )
            .override_request::<rawproduce::Request>(
                ApiKey::Produce,
                produce::MIN_VERSION..=produce::MAX_VERSION,
            )
            .finish()
    }

    pub fn api(&self, key: ApiKey) -> Result<&ApiType, ProtocolError> {
        self.apis
            .get(&key)
            .ok_or(ProtocolError::UnknownMessageKind(key.code()))
    }

    /// Looks up a kind by its raw wire key.
    pub fn api_by_code(&self, code: i16) -> Result<&ApiType, ProtocolError> {
        self.api(ApiKey::try_from(code)?)
    }

    /// Registered kinds in ascending key order.
    pub fn apis(&self) -> impl Iterator<Item = &ApiType> {
        self.apis.values()
    }

    fn entry(&self, msg: &dyn Message) -> Result<&TypeEntry, ProtocolError> {
        self.types
            .get(&msg.as_any().type_id())
            .ok_or(ProtocolError::UnregisteredType(msg.type_name()))
    }

    /// API key and declared versions of a concrete message.
    pub fn describe(&self, msg: &dyn Message) -> Result<(ApiKey, RangeInclusive<i16>), ProtocolError> {
        let entry = self.entry(msg)?;
        Ok((entry.key, entry.min_version..=entry.max_version))
    }

    /// Whether `msg` is an override of its kind's base type.
    pub fn is_override(&self, msg: &dyn Message) -> bool {
        self.entry(msg).map(|e| e.is_override).unwrap_or(false)
    }

    /// Resolves the encoder for `msg` written as `role` at `version`.
    pub fn encoder(
        &self,
        msg: &dyn Message,
        role: MessageRole,
        version: i16,
    ) -> Result<(&ApiType, EncodeFn), ProtocolError> {
        let entry = self.entry(msg)?;
        if entry.role != role {
            return Err(ProtocolError::encode(format!(
                "{} is a {} and cannot be written as a {}",
                entry.type_name, entry.role, role
            )));
        }
        let api = self.api(entry.key)?;
        if !(entry.min_version..=entry.max_version).contains(&version) {
            return Err(ProtocolError::UnsupportedVersion {
                api: api.name(),
                version,
                min: entry.min_version,
                max: entry.max_version,
            });
        }
        api.check_version(version)?;
        Ok((api, entry.encode))
    }

    /// Checks that every override names a registered kind and stays within
    /// its version range.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for entry in self.types.values() {
            let api = self.api(entry.key)?;
            if entry.min_version < api.min_version || entry.max_version > api.max_version {
                return Err(ProtocolError::InvalidRegistry(format!(
                    "{} declares v{}-v{} outside {} range v{}-v{}",
                    entry.type_name,
                    entry.min_version,
                    entry.max_version,
                    api.name(),
                    api.min_version,
                    api.max_version
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("apis", &self.apis.values().collect::<Vec<_>>())
            .field("types", &self.types.len())
            .finish()
    }
}

/// Process-wide standard registry, built on first use.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::standard)
}

/// Collects kinds and override types before freezing them into a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    apis: BTreeMap<ApiKey, ApiType>,
    types: HashMap<TypeId, TypeEntry>,
    duplicates: Vec<&'static str>,
}

impl RegistryBuilder {
    fn add_type<T: Message + Encode>(
        &mut self,
        key: ApiKey,
        role: MessageRole,
        versions: &RangeInclusive<i16>,
        is_override: bool,
    ) {
        let entry = TypeEntry {
            type_name: std::any::type_name::<T>(),
            key,
            role,
            min_version: *versions.start(),
            max_version: *versions.end(),
            is_override,
            encode: encode_as::<T>,
        };
        if self.types.insert(TypeId::of::<T>(), entry).is_some() {
            self.duplicates.push(std::any::type_name::<T>());
        }
    }

    /// Registers a kind with its base request and response types.
    pub fn api<Req, Resp>(
        mut self,
        key: ApiKey,
        versions: RangeInclusive<i16>,
        flexible_since: Option<i16>,
    ) -> Self
    where
        Req: Message + Encode + Decode,
        Resp: Message + Encode + Decode,
    {
        self.add_type::<Req>(key, MessageRole::Request, &versions, false);
        self.add_type::<Resp>(key, MessageRole::Response, &versions, false);
        self.apis.insert(
            key,
            ApiType {
                key,
                min_version: *versions.start(),
                max_version: *versions.end(),
                flexible_since,
                decode_request: decode_as::<Req>,
                decode_response: decode_as::<Resp>,
            },
        );
        self
    }

    /// Registers `T` as a request type whose encoding must match the base
    /// request of `key`.
    pub fn override_request<T: Message + Encode>(mut self, key: ApiKey, versions: RangeInclusive<i16>) -> Self {
        self.add_type::<T>(key, MessageRole::Request, &versions, true);
        self
    }

    /// Registers `T` as a response type whose encoding must match the base
    /// response of `key`.
    pub fn override_response<T: Message + Encode>(mut self, key: ApiKey, versions: RangeInclusive<i16>) -> Self {
        self.add_type::<T>(key, MessageRole::Response, &versions, true);
        self
    }

    fn finish(self) -> Registry {
        Registry {
            apis: self.apis,
            types: self.types,
        }
    }

    /// Freezes the builder, rejecting duplicate types and overrides that do
    /// not fit their base kind.
    pub fn build(self) -> Result<Registry, ProtocolError> {
        if let Some(name) = self.duplicates.first() {
            return Err(ProtocolError::InvalidRegistry(format!("{} is registered twice", name)));
        }
        let registry = self.finish();
        registry.validate()?;
        Ok(registry)
    }
}

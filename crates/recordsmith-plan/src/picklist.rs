use std::collections::{BTreeMap, HashMap, VecDeque};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use recordsmith_core::{Diagnostic, DiagnosticKind, FieldDescriptor, FieldType, ObjectSchema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Default number of decoded field pairs kept by [`PicklistDecoder`].
pub const DEFAULT_DECODER_CAPACITY: usize = 50;

/// Controlling value to the dependent values valid under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedDependency {
    pub dependent_field: String,
    pub controlling_field: String,
    pub mapping: BTreeMap<String, Vec<String>>,
    /// True when the bitmap could not be decoded and every dependent value
    /// was allowed.
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DecodedDependency {
    /// Dependent values allowed for `controlling_value`; empty when none are.
    pub fn values_for(&self, controlling_value: &str) -> &[String] {
        self.mapping
            .get(controlling_value)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn diagnostic(&self, object: &str) -> Option<Diagnostic> {
        if !self.fallback {
            return None;
        }
        let reason = self.reason.as_deref().unwrap_or("unknown");
        Some(
            Diagnostic::new(
                DiagnosticKind::BitmapDecodeFailure,
                format!(
                    "dependent picklist {} -> {} decoded permissively: {reason}",
                    self.controlling_field, self.dependent_field
                ),
            )
            .with_object(object)
            .with_field(&self.dependent_field),
        )
    }
}

/// Values the controlling field contributes, in bit order.
fn controlling_values(controlling: &FieldDescriptor) -> Vec<String> {
    if controlling.field_type == FieldType::Boolean {
        return vec!["false".to_string(), "true".to_string()];
    }
    controlling
        .active_options()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn bit_is_set(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index / 8)
        .is_some_and(|byte| (byte >> (7 - index % 8)) & 1 == 1)
}

/// Build the validity mapping from each dependent option's `valid_for`
/// bitmap. Bit *i* (most significant bit first) refers to the controlling
/// field's *i*-th active value.
pub fn decode_dependency(
    dependent: &FieldDescriptor,
    controlling: &FieldDescriptor,
) -> DecodedDependency {
    let controllers = controlling_values(controlling);
    match try_decode(dependent, &controllers) {
        Ok(mapping) => DecodedDependency {
            dependent_field: dependent.name.clone(),
            controlling_field: controlling.name.clone(),
            mapping,
            fallback: false,
            reason: None,
        },
        Err(reason) => {
            warn!(
                dependent = %dependent.name,
                controlling = %controlling.name,
                %reason,
                "picklist bitmap decode failed; allowing every dependent value"
            );
            let dependent_values: Vec<String> = dependent
                .active_options()
                .into_iter()
                .map(str::to_string)
                .collect();
            DecodedDependency {
                dependent_field: dependent.name.clone(),
                controlling_field: controlling.name.clone(),
                mapping: controllers
                    .into_iter()
                    .map(|value| (value, dependent_values.clone()))
                    .collect(),
                fallback: true,
                reason: Some(reason),
            }
        }
    }
}

fn try_decode(
    dependent: &FieldDescriptor,
    controllers: &[String],
) -> Result<BTreeMap<String, Vec<String>>, String> {
    if !dependent.field_type.is_select() {
        return Err(format!(
            "dependent field has type {}",
            dependent.field_type.as_str()
        ));
    }
    if controllers.is_empty() {
        return Err("controlling field has no active values".to_string());
    }

    let mut mapping: BTreeMap<String, Vec<String>> = controllers
        .iter()
        .map(|value| (value.clone(), Vec::new()))
        .collect();

    for option in dependent.options.iter().filter(|option| option.active) {
        let Some(bitmap) = &option.valid_for else {
            for values in mapping.values_mut() {
                values.push(option.value.clone());
            }
            continue;
        };
        let bytes = STANDARD
            .decode(bitmap.trim())
            .map_err(|err| format!("invalid bitmap for `{}`: {err}", option.value))?;
        for (index, controller) in controllers.iter().enumerate() {
            if bit_is_set(&bytes, index) {
                if let Some(values) = mapping.get_mut(controller) {
                    values.push(option.value.clone());
                }
            }
        }
    }

    Ok(mapping)
}

/// Encode controlling-value indices as a `valid_for` bitmap.
pub fn encode_valid_for(indices: &[usize]) -> String {
    let len = indices.iter().max().map_or(1, |max| max / 8 + 1);
    let mut bytes = vec![0u8; len];
    for index in indices {
        bytes[index / 8] |= 1 << (7 - index % 8);
    }
    STANDARD.encode(bytes)
}

/// Object, dependent field, controlling field and a digest of the
/// metadata the mapping is decoded from.
type DecoderKey = (String, String, String, String);

/// Hash of everything [`decode_dependency`] reads, so an edited bitmap or
/// option list never hits a stale entry.
fn dependency_digest(dependent: &FieldDescriptor, controlling: &FieldDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dependent.field_type.as_str().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(controlling.field_type.as_str().as_bytes());
    for value in controlling_values(controlling) {
        hasher.update([0x1e_u8]);
        hasher.update(value.as_bytes());
    }
    for option in &dependent.options {
        hasher.update([0x1d_u8]);
        hasher.update(option.value.as_bytes());
        hasher.update([u8::from(option.active)]);
        if let Some(bitmap) = &option.valid_for {
            hasher.update([0x1c_u8]);
            hasher.update(bitmap.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Decodes dependent picklists, keeping the most recently used pairs.
#[derive(Debug)]
pub struct PicklistDecoder {
    capacity: usize,
    entries: HashMap<DecoderKey, DecodedDependency>,
    recency: VecDeque<DecoderKey>,
    hits: u64,
    misses: u64,
}

impl Default for PicklistDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_DECODER_CAPACITY)
    }
}

impl PicklistDecoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Decode the dependency of `dependent` on its controlling field.
    ///
    /// Returns `None` when the field is not dependent or its controlling
    /// field is missing from the object.
    pub fn decode(
        &mut self,
        object: &ObjectSchema,
        dependent: &FieldDescriptor,
    ) -> Option<DecodedDependency> {
        let controlling_name = dependent.controlling_field.as_deref()?;
        let controlling = object.field(controlling_name)?;
        let key = (
            object.name.clone(),
            dependent.name.clone(),
            controlling.name.clone(),
            dependency_digest(dependent, controlling),
        );

        if let Some(decoded) = self.entries.get(&key) {
            self.hits += 1;
            let decoded = decoded.clone();
            self.touch(&key);
            return Some(decoded);
        }

        self.misses += 1;
        let decoded = decode_dependency(dependent, controlling);
        debug!(
            object = %object.name,
            dependent = %dependent.name,
            controlling = %controlling.name,
            fallback = decoded.fallback,
            "decoded dependent picklist"
        );
        self.insert(key, decoded.clone());
        Some(decoded)
    }

    fn touch(&mut self, key: &DecoderKey) {
        if let Some(position) = self.recency.iter().position(|entry| entry == key) {
            self.recency.remove(position);
        }
        self.recency.push_back(key.clone());
    }

    fn insert(&mut self, key: DecoderKey, decoded: DecodedDependency) {
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.recency.push_back(key.clone());
        self.entries.insert(key, decoded);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

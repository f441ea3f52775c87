//! Resource ids: a 4-char kind prefix followed by a 26-char nanoid, 30 chars total.
//!
//! Ids are lowercase alphanumeric so upload ids can be used verbatim in the
//! ingested table name.

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// The kind of resource an id names. Each kind has a distinct 4-char prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceId {
    Upload,
    Dataset,
    Attribute,
    Map,
    Layer,
    Basemap,
    Palette,
}

impl ResourceId {
    pub const ALL: [ResourceId; 7] = [
        Self::Upload,
        Self::Dataset,
        Self::Attribute,
        Self::Map,
        Self::Layer,
        Self::Basemap,
        Self::Palette,
    ];

    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Upload => "upld",
            Self::Dataset => "dset",
            Self::Attribute => "attr",
            Self::Map => "mapp",
            Self::Layer => "layr",
            Self::Basemap => "base",
            Self::Palette => "palt",
        }
    }

    /// The kind an id belongs to, judged by its prefix.
    pub fn of(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| id.starts_with(kind.prefix()))
    }
}

/// Generate a 30-char ID: 4-char prefix + 26-char nanoid (lowercase alphanumeric).
pub fn generate_id(resource: ResourceId) -> String {
    let suffix = nanoid::nanoid!(26, &ID_ALPHABET);
    format!("{}{}", resource.prefix(), suffix)
}

/// Generate an upload ID (prefix: "upld"). Also seeds the ingested table name.
pub fn generate_upload_id() -> String {
    generate_id(ResourceId::Upload)
}

/// Generate a dataset ID (prefix: "dset").
pub fn generate_dataset_id() -> String {
    generate_id(ResourceId::Dataset)
}

/// Generate a data attribute ID (prefix: "attr").
pub fn generate_attribute_id() -> String {
    generate_id(ResourceId::Attribute)
}

/// Generate a map ID (prefix: "mapp").
pub fn generate_map_id() -> String {
    generate_id(ResourceId::Map)
}

/// Generate a map layer ID (prefix: "layr").
pub fn generate_layer_id() -> String {
    generate_id(ResourceId::Layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_id_format() {
        let id = generate_upload_id();
        assert_eq!(id.len(), 30);
        assert!(id.starts_with("upld"));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_layer_id_format() {
        let id = generate_layer_id();
        assert_eq!(id.len(), 30);
        assert!(id.starts_with("layr"));
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = generate_dataset_id();
        let id2 = generate_dataset_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_prefixes_are_distinct_and_in_alphabet() {
        for (i, kind) in ResourceId::ALL.iter().enumerate() {
            let prefix = kind.prefix();
            assert_eq!(prefix.len(), 4);
            assert!(prefix.chars().all(|c| ID_ALPHABET.contains(&c)));
            assert!(ResourceId::ALL[i + 1..]
                .iter()
                .all(|other| other.prefix() != prefix));
        }
    }

    #[test]
    fn test_kind_of_id() {
        assert_eq!(ResourceId::of(&generate_map_id()), Some(ResourceId::Map));
        assert_eq!(ResourceId::of("conn_abc"), None);
    }

    #[test]
    fn test_resource_id_prefixes() {
        assert_eq!(ResourceId::Upload.prefix(), "upld");
        assert_eq!(ResourceId::Map.prefix(), "mapp");
        assert_eq!(ResourceId::Palette.prefix(), "palt");
    }
}

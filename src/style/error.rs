use thiserror::Error;

/// Reasons a style document cannot be composed. No partial document is produced.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("basemap style has no shared label style ('mapstudio:label-style')")]
    MissingLabelStyle,

    #[error("map '{0}' not found")]
    MapNotFound(String),

    #[error("basemap '{0}' not found")]
    BasemapNotFound(String),

    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("attribute '{attribute}' not found on dataset '{dataset}'")]
    AttributeNotFound { dataset: String, attribute: String },

    #[error("palette '{0}' not found")]
    PaletteNotFound(String),

    #[error("no layer type for geometry type '{0}'")]
    UnsupportedGeometry(String),

    #[error("invalid style template: {0}")]
    InvalidTemplate(String),
}

impl StyleError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MapNotFound(_)
                | Self::BasemapNotFound(_)
                | Self::DatasetNotFound(_)
                | Self::AttributeNotFound { .. }
                | Self::PaletteNotFound(_)
        )
    }
}

pub mod loader;
pub mod types;

pub use loader::{clean_prices, parse_date, DataLoader, LoaderError, LoaderResult};
pub use types::{
    FeaturePanel, LabelPanel, PanelKey, PredictionPanel, PricePanel, ScalarPanel,
    LABEL_COLUMN, PREDICTION_COLUMN,
};

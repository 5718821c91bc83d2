/// Service layer for the image resizer
///
/// - fetcher: download and decode source images
/// - transformer: resize and re-encode
/// - resizer: orchestration over cache, fetcher, transformer and queue
pub mod fetcher;
pub mod resizer;
pub mod single_flight;
pub mod transformer;

pub use fetcher::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use resizer::ResizerService;
pub use single_flight::SingleFlight;
pub use transformer::{ImageTransformer, TransformerConfig};

mod extractor;

pub use extractor::NewspaperClient;

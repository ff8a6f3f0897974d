mod downloader;

pub use downloader::Downloader;

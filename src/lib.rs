pub mod api;
pub mod core;
pub mod page_extractor;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("pdf_image_lib"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // already-initialised loggers are fine, tests call this repeatedly
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}

//! ESP-IDF link setup plus build-time secrets.
//!
//! Values are read from the environment or a `.env` file next to this
//! crate and re-exported to the firmware as `option_env!` constants.

const SECRETS: &[&str] = &[
    "TAPNODE_ENDPOINT_URL",
    "TAPNODE_API_KEY",
    "TAPNODE_DEVICE_ID",
    "TAPNODE_FALLBACK_SSID",
    "TAPNODE_FALLBACK_SECRET",
    "TAPNODE_APN",
];

fn main() {
    embuild::espidf::sysenv::output();

    println!("cargo:rerun-if-changed=.env");
    // A missing .env is fine; values may come from the shell
    let _ = dotenvy::dotenv();

    for key in SECRETS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}

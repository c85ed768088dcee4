use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var("CARGO_FEATURE_GPU").is_ok() {
        println!("cargo:warning=Color clustering: CUDA k-means backend enabled");

        let target = env::var("TARGET").unwrap_or_default();
        if target.contains("apple") {
            println!("cargo:warning=WARNING: CUDA is not available on Apple targets, clustering will run on CPU");
        }
    }
}

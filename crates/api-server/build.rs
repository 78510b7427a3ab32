fn main() {
    // Re-embed the calculator page when it changes
    println!("cargo:rerun-if-changed=../../frontend/index.html");
    println!("cargo:rerun-if-changed=../../frontend/static/");
}

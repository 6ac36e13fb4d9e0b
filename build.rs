fn main() {
    // ESP-IDF link arguments only exist when cross-building for the chip.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}

#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use nxfirm::format::blz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let _ = blz::decompress(data);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}

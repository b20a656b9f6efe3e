use skm_common::crypto;

/// [`crypto::Rng`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OpenSslRng;

impl crypto::Rng for OpenSslRng {
    fn add_entropy(&mut self, data: &[u8]) {
        let Ok(len) = libc::c_int::try_from(data.len()) else {
            log::warn!("ignoring {} bytes of additional entropy", data.len());
            return;
        };
        unsafe {
            // Safety: `data` is a valid slice of `len` bytes.
            ffi::RAND_add(data.as_ptr() as *const libc::c_void, len, len as f64);
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = openssl::rand::rand_bytes(dest) {
            // RAND_bytes() only fails if the generator cannot be seeded.
            panic!("OpenSSL RNG failure: {:?}", e);
        }
    }
}

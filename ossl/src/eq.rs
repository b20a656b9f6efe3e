use skm_common::crypto;

/// Constant time comparator based on OpenSSL.
#[derive(Clone, Default)]
pub struct OpenSslEq;

impl crypto::ConstTimeEq for OpenSslEq {
    fn eq(&self, left: &[u8], right: &[u8]) -> bool {
        if left.len() != right.len() {
            return false;
        }
        openssl::memcmp::eq(left, right)
    }
}

use sha2::{Digest, Sha256, Sha512};

use rand::rngs::OsRng;
use rand::RngCore;

use actix_web::cookie::Key;

use crate::models::User;

pub fn get_salt<const N: usize>() -> [u8; N] {
    let mut salt = [0u8; N];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Clients send sha256(cleartext) as hex; the stored credential is that
/// digest salted and peppered again. Plaintext never reaches the wire or
/// the database.
pub fn gen_salted_password(password: &str, token: &str) -> (String, String) {
    let salt = get_salt::<32>();

    let mut hasher = Sha256::new();
    hasher.update(token);
    hasher.update(password);
    hasher.update(salt);
    let calculated_hash = hasher.finalize();

    (hex::encode(salt), hex::encode(calculated_hash.as_slice()))
}

pub fn check_salted_password<'a>(
    user: &'a User,
    password_input: &str,
    token: &str,
) -> Option<&'a User> {
    let mut salt = [0u8; 32];
    hex::decode_to_slice(&user.salt, &mut salt).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(token);
    hasher.update(password_input);
    hasher.update(salt);

    let calculated_hash = hasher.finalize();

    let mut expected_hash = [0u8; 32];
    hex::decode_to_slice(&user.password, &mut expected_hash).ok()?;

    if calculated_hash.as_slice() == &expected_hash[..] {
        Some(user)
    } else {
        None
    }
}

pub fn gen_cookie_key(cookie_token: &str) -> Key {
    let mut hasher = Sha512::new();
    hasher.update(cookie_token);
    Key::from(hasher.finalize().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_user(password: &str, salt: &str) -> User {
        User {
            id: 1,
            email: "a@b.c".into(),
            nickname: "a".into(),
            realname: "A B".into(),
            password: password.into(),
            salt: salt.into(),
            privilege: 0,
            active: true,
            tag: None,
        }
    }

    #[test]
    fn salted_password_round_trip() {
        let (salt, hash) = gen_salted_password("deadbeef", "pepper");
        let user = dummy_user(&hash, &salt);
        assert!(check_salted_password(&user, "deadbeef", "pepper").is_some());
        assert!(check_salted_password(&user, "deadbeee", "pepper").is_none());
        assert!(check_salted_password(&user, "deadbeef", "other").is_none());
    }

    #[test]
    fn distinct_salts_per_registration() {
        let (salt_a, hash_a) = gen_salted_password("deadbeef", "pepper");
        let (salt_b, hash_b) = gen_salted_password("deadbeef", "pepper");
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);
    }
}

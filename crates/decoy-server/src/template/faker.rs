//! Fake data providers for `faker.*` placeholders.
//!
//! Generation goes through [`FakeDataSource`] so tests can swap in a
//! [`SeededFaker`] and assert exact output.

use fake::faker::address::en::CityName;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{IPv4, SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Keys understood by the built-in generators (without the `faker.` prefix).
pub const FAKER_KEYS: &[&str] = &[
    "random.uuid",
    "random.number",
    "random.boolean",
    "random.word",
    "name.fullName",
    "name.firstName",
    "name.lastName",
    "internet.email",
    "internet.userName",
    "internet.ipv4",
    "phone.number",
    "company.name",
    "address.city",
    "lorem.sentence",
];

/// Source of synthetic values for `faker.*` placeholders.
pub trait FakeDataSource: Send + Sync {
    /// Generate a value for `key` (e.g. `name.fullName`), or `None` if unknown.
    fn generate(&self, key: &str) -> Option<String>;
}

/// Thread-local RNG; different output on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFaker;

impl FakeDataSource for RandomFaker {
    fn generate(&self, key: &str) -> Option<String> {
        fake_value(key, &mut rand::thread_rng())
    }
}

/// Deterministic generator: the same seed yields the same sequence.
pub struct SeededFaker {
    rng: Mutex<StdRng>,
}

impl SeededFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl FakeDataSource for SeededFaker {
    fn generate(&self, key: &str) -> Option<String> {
        let mut rng = self.rng.lock();
        fake_value(key, &mut *rng)
    }
}

fn fake_value<R: Rng + ?Sized>(key: &str, rng: &mut R) -> Option<String> {
    let value = match key.to_ascii_lowercase().as_str() {
        "random.uuid" | "random.guid" => {
            uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string()
        }
        "random.number" => rng.gen_range(0..10_000u32).to_string(),
        "random.boolean" => rng.gen::<bool>().to_string(),
        "random.word" => Word().fake_with_rng(rng),
        "name.fullname" => Name().fake_with_rng(rng),
        "name.firstname" => FirstName().fake_with_rng(rng),
        "name.lastname" => LastName().fake_with_rng(rng),
        "internet.email" => SafeEmail().fake_with_rng(rng),
        "internet.username" => Username().fake_with_rng(rng),
        "internet.ipv4" | "internet.ip" => IPv4().fake_with_rng(rng),
        "phone.number" => PhoneNumber().fake_with_rng(rng),
        "company.name" => CompanyName().fake_with_rng(rng),
        "address.city" => CityName().fake_with_rng(rng),
        "lorem.sentence" => Sentence(3..8).fake_with_rng(rng),
        _ => return None,
    };
    Some(value)
}

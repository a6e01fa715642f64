use rand::Rng;
#[cfg(test)] use std::sync::Mutex;



#[cfg(test)]
/// automock expectations for static methods are global - hold this lock to avoid races
pub static MOCK_RANDOM_MUTEX: Mutex<()> = Mutex::new(());

#[cfg_attr(test, mockall::automock)]
pub trait Random {
    /// a non-negative client id, the same range as C's `rand()`
    fn next_client_id() -> i32;

    /// returns true with the given probability, which is expected to be in `0.0..=1.0`
    fn chance(probability: f64) -> bool;
}
pub struct RngRandom {}
impl Random for RngRandom {
    fn next_client_id() -> i32 {
        rand::thread_rng().gen_range(0..=i32::MAX)
    }

    fn chance(probability: f64) -> bool {
        rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
    }
}

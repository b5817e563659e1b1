mod hello;
mod ready;

pub use self::hello::Hello;
pub use self::ready::Ready;

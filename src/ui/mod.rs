pub mod capabilities;
pub mod chat_loop;
pub mod renderer;
pub mod state;

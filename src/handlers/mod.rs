pub mod chat;
pub mod parceiros;
pub mod pedidos;
pub mod produtos;

pub mod openai;
pub mod whatsapp;

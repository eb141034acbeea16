pub mod can;

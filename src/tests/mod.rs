// Test modules for Threadline
// Each module covers the public behavior of the corresponding source file

mod lib_tests;
mod model_tests;
mod pagination_tests;
mod receipts_tests;
mod settings_tests;
mod transport_tests;

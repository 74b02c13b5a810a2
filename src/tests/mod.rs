/*
 * Test Suite for the posixio I/O Core
 *
 * Host-side scenario tests that drive the drivers and the posixio layer
 * against mock hardware. Unit tests of single types live next to the code
 * in `#[cfg(test)]` modules; the tests here cross module boundaries.
 *
 * ## Modules
 *
 * - `mock` - Mock USART, DMA, NVIC and pin registers plus the host clock
 * - `dma_tests` - Channel allocation, shared vectors and interrupt dispatch
 * - `serial_tests` - Port start-up, DMA and queue transmit, receive overrun
 * - `posixio_tests` - Descriptor routing, device registry and stdio
 */

pub mod mock;

/*
 * Debugging and Logging Utilities
 *
 * This module contains the `log` backend that prints to the console serial
 * port, polled during early boot and through the driver once stdio is up.
 */

pub mod logger;

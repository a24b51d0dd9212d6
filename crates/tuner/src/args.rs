//! The typed heterogeneous argument list shared by all kernel variants.
//!
//! Ordinals are assigned in call order across every registration method and
//! are dense from zero; each kernel variant must declare the full list.

use tunesmith_device::{
    BufferAccess, BufferId, Device, DeviceError, ElemType, Element, KernelArg, KernelId,
    ScalarValue,
};

pub(crate) struct InputArgument {
    pub ordinal: usize,
    pub buffer: BufferId,
}

pub(crate) struct OutputArgument {
    pub ordinal: usize,
    pub buffer: BufferId,
    pub len: usize,
    pub elem: ElemType,
    /// Host copy of the reference kernel's output, written once.
    pub snapshot: Option<Vec<u8>>,
}

impl OutputArgument {
    pub fn byte_len(&self) -> usize {
        self.len * self.elem.size_bytes()
    }
}

#[derive(Default)]
pub struct ArgumentStore {
    counter: usize,
    inputs: Vec<InputArgument>,
    outputs: Vec<OutputArgument>,
    scalars: Vec<(usize, ScalarValue)>,
}

impl ArgumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ordinal(&mut self) -> usize {
        let ordinal = self.counter;
        self.counter += 1;
        ordinal
    }

    /// Uploads `data` into a read-only device buffer; immutable thereafter.
    pub fn add_input<T: Element>(
        &mut self,
        device: &mut dyn Device,
        data: &[T],
    ) -> Result<usize, DeviceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = device.create_buffer(bytes.len(), BufferAccess::ReadOnly)?;
        device.write_buffer(buffer, bytes)?;
        let ordinal = self.next_ordinal();
        self.inputs.push(InputArgument { ordinal, buffer });
        Ok(ordinal)
    }

    /// Allocates a read-write device buffer of `len` elements of `T`.
    pub fn add_output<T: Element>(
        &mut self,
        device: &mut dyn Device,
        len: usize,
    ) -> Result<usize, DeviceError> {
        let buffer =
            device.create_buffer(len * std::mem::size_of::<T>(), BufferAccess::ReadWrite)?;
        let ordinal = self.next_ordinal();
        self.outputs.push(OutputArgument {
            ordinal,
            buffer,
            len,
            elem: T::TYPE,
            snapshot: None,
        });
        Ok(ordinal)
    }

    pub fn add_scalar(&mut self, value: ScalarValue) -> usize {
        let ordinal = self.next_ordinal();
        self.scalars.push((ordinal, value));
        ordinal
    }

    pub fn len(&self) -> usize {
        self.counter
    }

    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }

    /// Binds every argument to its positional slot, in ordinal order.
    pub fn bind(&self, device: &mut dyn Device, kernel: KernelId) -> Result<(), DeviceError> {
        let mut slots: Vec<(usize, KernelArg)> = Vec::with_capacity(self.counter);
        slots.extend(
            self.inputs
                .iter()
                .map(|arg| (arg.ordinal, KernelArg::Buffer(arg.buffer))),
        );
        slots.extend(
            self.outputs
                .iter()
                .map(|arg| (arg.ordinal, KernelArg::Buffer(arg.buffer))),
        );
        slots.extend(
            self.scalars
                .iter()
                .map(|(ordinal, value)| (*ordinal, KernelArg::Scalar(*value))),
        );
        slots.sort_by_key(|(ordinal, _)| *ordinal);
        for (ordinal, arg) in slots {
            device.set_argument(kernel, ordinal, arg)?;
        }
        Ok(())
    }

    /// Overwrites every output buffer with zeros of its element type.
    pub fn reset_outputs(&self, device: &mut dyn Device) -> Result<(), DeviceError> {
        for output in &self.outputs {
            let zeros = vec![0u8; output.byte_len()];
            device.write_buffer(output.buffer, &zeros)?;
        }
        Ok(())
    }

    /// Reads every output buffer into its snapshot slot.
    pub fn take_snapshots(&mut self, device: &dyn Device) -> Result<(), DeviceError> {
        for output in &mut self.outputs {
            let mut bytes = vec![0u8; output.byte_len()];
            device.read_buffer(output.buffer, &mut bytes)?;
            output.snapshot = Some(bytes);
        }
        Ok(())
    }

    pub fn has_snapshots(&self) -> bool {
        self.outputs.iter().any(|output| output.snapshot.is_some())
    }

    pub(crate) fn outputs(&self) -> &[OutputArgument] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesmith_device::HostDevice;

    #[test]
    fn ordinals_are_dense_across_argument_kinds() {
        let mut device = HostDevice::new();
        let mut store = ArgumentStore::new();
        let a = store.add_scalar(ScalarValue::Int32(7));
        let b = store.add_input(&mut device, &[1.0f32, 2.0]).unwrap();
        let c = store.add_output::<f32>(&mut device, 2).unwrap();
        let d = store.add_scalar(ScalarValue::Float64(0.5));
        assert_eq!((a, b, c, d), (0, 1, 2, 3));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn reset_zeroes_every_output_element() {
        let mut device = HostDevice::new();
        let mut store = ArgumentStore::new();
        store.add_output::<f32>(&mut device, 4).unwrap();
        let buffer = store.outputs()[0].buffer;
        device
            .write_buffer(buffer, bytemuck::cast_slice(&[9.0f32, 9.0, 9.0, 9.0]))
            .unwrap();

        store.reset_outputs(&mut device).unwrap();
        let mut bytes = vec![0u8; 16];
        device.read_buffer(buffer, &mut bytes).unwrap();
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(values, vec![0.0; 4]);
    }

    #[test]
    fn snapshots_capture_current_contents() {
        let mut device = HostDevice::new();
        let mut store = ArgumentStore::new();
        store.add_output::<i32>(&mut device, 2).unwrap();
        let buffer = store.outputs()[0].buffer;
        device
            .write_buffer(buffer, bytemuck::cast_slice(&[5i32, -5]))
            .unwrap();

        assert!(!store.has_snapshots());
        store.take_snapshots(&device).unwrap();
        assert!(store.has_snapshots());
        let snapshot = store.outputs()[0].snapshot.as_ref().unwrap();
        let values: Vec<i32> = bytemuck::pod_collect_to_vec(snapshot);
        assert_eq!(values, vec![5, -5]);
    }
}

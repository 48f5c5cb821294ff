/// Byte order for the spill file record codec, chosen once at aggregator
/// construction (`useBigEndian`) and used consistently for every record in
/// every run file the instance produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn write_u32(&self, out: &mut Vec<u8>, v: u32) {
        match self {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    pub fn read_u32(&self, buf: &[u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(*buf),
            Endian::Big => u32::from_be_bytes(*buf),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trips_both_orders() {
        for endian in [Endian::Little, Endian::Big] {
            let mut buf = Vec::new();
            endian.write_u32(&mut buf, 0xdead_beef);
            let arr: [u8; 4] = buf.try_into().unwrap();
            assert_eq!(endian.read_u32(&arr), 0xdead_beef);
        }
    }
}
